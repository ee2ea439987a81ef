//! String element reads shared by attributes and datasets.

use crate::error::{Result, StorageResultExt};
use crate::handle::TypeHandle;
use crate::storage::{CharacterSet, Hid, Storage, StringPadding, StringSize};

/// Where string elements are read from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Source {
    Attribute(Hid),
    Dataset(Hid),
}

impl Source {
    fn read(self, storage: &dyn Storage, memory: Hid, buf: &mut [u8]) -> Result<()> {
        match self {
            Source::Attribute(attr) => storage
                .attr_read(attr, memory, buf)
                .io_context("read attribute"),
            Source::Dataset(dataset) => storage
                .dataset_read(dataset, memory, None, None, buf)
                .io_context("read dataset"),
        }
    }

    fn read_var(self, storage: &dyn Storage, memory: Hid) -> Result<Vec<Vec<u8>>> {
        match self {
            Source::Attribute(attr) => storage
                .attr_read_var_strings(attr, memory)
                .io_context("read attribute"),
            Source::Dataset(dataset) => storage
                .dataset_read_var_strings(dataset, memory)
                .io_context("read dataset"),
        }
    }
}

/// Text up to the first NUL. Invalid UTF-8 becomes U+FFFD.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Read `count` string elements of the file type `datatype`.
///
/// Fixed-length strings are read through a NUL-terminated memory type one
/// byte longer than declared, so the text always ends inside its slot.
pub(crate) fn read_strings(
    storage: &dyn Storage,
    source: Source,
    datatype: Hid,
    count: usize,
) -> Result<Vec<String>> {
    if storage
        .type_is_variable_str(datatype)
        .io_context("query string type")?
    {
        let memory = TypeHandle::acquire(
            storage,
            storage.type_string(
                StringSize::Variable,
                StringPadding::NullTerminate,
                CharacterSet::Utf8,
            ),
        )
        .io_context("create string memory type")?;
        let raw = source.read_var(storage, memory.get())?;
        return Ok(raw.iter().map(|bytes| decode_text(bytes)).collect());
    }

    let slot = storage.type_size(datatype).io_context("query string size")? + 1;
    let memory = TypeHandle::acquire(
        storage,
        storage.type_string(
            StringSize::Fixed(slot),
            StringPadding::NullTerminate,
            CharacterSet::Utf8,
        ),
    )
    .io_context("create string memory type")?;
    let mut buf = vec![0u8; slot * count];
    source.read(storage, memory.get(), &mut buf)?;
    Ok(buf.chunks(slot).map(decode_text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_first_nul() {
        assert_eq!(decode_text(b"ab\0cd"), "ab");
        assert_eq!(decode_text(b"abc"), "abc");
        assert_eq!(decode_text(b"\0"), "");
    }

    #[test]
    fn invalid_utf8_replaced() {
        assert_eq!(decode_text(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }
}
