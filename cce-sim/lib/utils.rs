//! Output helpers.

/// Create a directory and all of its parents, returning an
/// [`io::Result`][std::io::Result].
#[macro_export]
macro_rules! mkdir {
    ( $dir:expr ) => {
        std::fs::create_dir_all(&$dir)
    }
}

/// Write a series of named arrays to an `.npz` archive, returning a
/// [`CceResult`][crate::error::CceResult].
///
/// ```ignore
/// write_npz!(
///     outdir.join("bath.npz"),
///     arrays: {
///         "coords" => &coords,
///         "states" => &states,
///     }
/// )?;
/// ```
#[macro_export]
macro_rules! write_npz {
    (
        $filename:expr,
        arrays: { $( $name:expr => $array:expr ),* $(,)? } $(,)?
    ) => {
        (|| -> $crate::error::CceResult<()> {
            let mut npz
                = $crate::ndarray_npy::NpzWriter::new(
                    std::fs::File::create($filename)?);
            $( npz.add_array($name, $array)?; )*
            npz.finish()?;
            Ok(())
        })()
    }
}
