//! Assembly of per-order result matrices on the coordinator.

use ndarray as nd;
use crate::{
    dispatch::AssignedCluster,
    error::{ CceError, CceResult },
    partition::Partition,
    transport::{ Communicator, COORDINATOR, Payload, PayloadKind },
};

/// One rank's evolved block for a single order.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceResult {
    pub order: usize,
    /// Global index of each column's cluster.
    pub ids: Vec<usize>,
    /// `n_time × ids.len()`.
    pub data: nd::Array2<f64>,
}

impl SliceResult {
    pub fn new(order: usize, clusters: &[AssignedCluster], data: nd::Array2<f64>)
        -> Self
    {
        let ids = clusters.iter().map(|a| a.id.index).collect();
        Self { order, ids, data }
    }
}

/// Send a non-coordinator rank's block to the coordinator.
pub fn submit<C>(comm: &C, result: SliceResult) -> CceResult<()>
where C: Communicator + ?Sized
{
    let SliceResult { order, ids, data } = result;
    comm.send(COORDINATOR, order, Payload::ResultData { ids, data })
}

/// Place one block into the full matrix after checking it against the block
/// the partition assigns to `rank`.
fn place(
    full: &mut nd::Array2<f64>,
    partition: &Partition,
    rank: usize,
    order: usize,
    ids: &[usize],
    data: &nd::Array2<f64>,
) -> CceResult<()>
{
    let slice = partition.slice(rank, order);
    let bad = |reason: String| CceError::transport(rank, COORDINATOR, reason);
    if !ids.iter().copied().eq(slice.range()) {
        return Err(bad(format!(
            "order {} block carries clusters {:?}; expected {}..{}",
            order + 1, ids, slice.lo, slice.hi,
        )));
    }
    if data.dim() != (full.nrows(), slice.len()) {
        return Err(bad(format!(
            "order {} block has shape {:?}; expected {:?}",
            order + 1, data.dim(), (full.nrows(), slice.len()),
        )));
    }
    full.slice_mut(nd::s![.., slice.lo..slice.hi]).assign(data);
    Ok(())
}

/// Collect every rank's block for `order` and assemble the
/// `n_time × count` matrix, with each block placed at its slice's column
/// offset. Returns only once every rank has reported.
pub fn collect<C>(
    comm: &C,
    partition: &Partition,
    n_time: usize,
    local: SliceResult,
) -> CceResult<nd::Array2<f64>>
where C: Communicator + ?Sized
{
    let order = local.order;
    let count = partition.counts()[order];
    let mut full: nd::Array2<f64> = nd::Array2::zeros((n_time, count));
    place(&mut full, partition, COORDINATOR, order, &local.ids, &local.data)?;
    for source in (0..comm.size()).filter(|r| *r != COORDINATOR) {
        let env = comm.recv(source, PayloadKind::ResultData, order)?;
        let (ids, data)
            = match env.payload {
                Payload::ResultData { ids, data } => (ids, data),
                other => return Err(CceError::transport(source, COORDINATOR, format!(
                    "expected result-data payload for order {}, got {}",
                    order + 1, other.kind(),
                ))),
            };
        place(&mut full, partition, source, order, &ids, &data)?;
    }
    tracing::debug!(order = order + 1, shape = ?full.dim(), "gathered order");
    Ok(full)
}

/// Gather one order's results: the coordinator returns the assembled matrix,
/// every other rank sends its block and returns `None`.
pub fn gather<C>(
    comm: &C,
    partition: Option<&Partition>,
    n_time: usize,
    local: SliceResult,
) -> CceResult<Option<nd::Array2<f64>>>
where C: Communicator + ?Sized
{
    if comm.is_coordinator() {
        let partition
            = partition.ok_or_else(|| {
                CceError::config("coordinator requires the partition to gather")
            })?;
        collect(comm, partition, n_time, local).map(Some)
    } else {
        submit(comm, local).map(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ ChannelComm, tests::ScriptedComm };

    fn block(order: usize, lo: usize, hi: usize, n_time: usize) -> SliceResult {
        let data
            = nd::Array2::from_shape_fn(
                (n_time, hi - lo), |(t, j)| (t * 10 + lo + j) as f64);
        SliceResult { order, ids: (lo..hi).collect(), data }
    }

    #[test]
    fn blocks_land_at_slice_offsets() {
        let partition = Partition::new(&[7], 3).unwrap();
        let mut world = ChannelComm::world(3);
        let w2 = world.pop().unwrap();
        let w1 = world.pop().unwrap();
        let coord = world.pop().unwrap();
        // send out of rank order
        submit(&w2, block(0, 5, 7, 2)).unwrap();
        submit(&w1, block(0, 3, 5, 2)).unwrap();
        let full = collect(&coord, &partition, 2, block(0, 0, 3, 2)).unwrap();
        let expected = nd::Array2::from_shape_fn((2, 7), |(t, j)| (t * 10 + j) as f64);
        assert_eq!(full, expected);
    }

    #[test]
    fn misplaced_block_rejected() {
        let partition = Partition::new(&[4], 2).unwrap();
        let mut world = ChannelComm::world(2);
        let w1 = world.pop().unwrap();
        let coord = world.pop().unwrap();
        submit(&w1, block(0, 1, 3, 2)).unwrap();
        assert!(matches!(
            collect(&coord, &partition, 2, block(0, 0, 2, 2)),
            Err(CceError::Transport { from: 1, .. }),
        ));
    }

    #[test]
    fn wrong_payload_kind_rejected() {
        let partition = Partition::new(&[4], 2).unwrap();
        let coord
            = ScriptedComm::new(0, 2, vec![Payload::Abort("wrong kind".to_string())]);
        assert!(matches!(
            collect(&coord, &partition, 2, block(0, 0, 2, 2)),
            Err(CceError::Transport { from: 1, to: 0, .. }),
        ));
    }

    #[test]
    fn wrong_time_length_rejected() {
        let partition = Partition::new(&[2], 1).unwrap();
        let world = ChannelComm::world(1);
        assert!(collect(&world[0], &partition, 3, block(0, 0, 2, 2)).is_err());
    }
}
