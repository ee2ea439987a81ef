//! [`Storage`] over the HDF5 C library, through `hdf5-metno-sys`.
//!
//! Every call holds the binding's global reentrant lock. The library's own
//! error printing is switched off; failures surface as [`StorageError`].
//!
//! Link queries and variable-length reclaim use the 1.12 API when the linked
//! library provides it (`cfg(hdf5_1_12)`, set by the build script).

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::ptr;

use hdf5_metno_sys::h5::{herr_t, hsize_t, htri_t, H5free_memory, H5open, H5_INDEX_NAME, H5_ITER_INC};
use hdf5_metno_sys::h5a::{
    H5A_info_t, H5Aclose, H5Acreate2, H5Adelete, H5Aexists, H5Aget_space, H5Aget_type,
    H5Aiterate2, H5Aopen, H5Aread, H5Awrite,
};
use hdf5_metno_sys::h5d::{
    H5D_layout_t, H5Dclose, H5Dcreate2, H5Dget_create_plist, H5Dget_space, H5Dget_type,
    H5Dread, H5Dwrite,
};
use hdf5_metno_sys::h5e::{H5Eset_auto2, H5E_DEFAULT};
use hdf5_metno_sys::h5f::{H5Fclose, H5Fcreate, H5Fopen, H5F_ACC_EXCL, H5F_ACC_RDONLY, H5F_ACC_RDWR};
use hdf5_metno_sys::h5g::{H5G_info_t, H5Gclose, H5Gcreate2, H5Gget_info};
use hdf5_metno_sys::h5i::{hid_t, H5I_type_t, H5Iget_type};
use hdf5_metno_sys::h5l::{
    H5L_type_t, H5Lcreate_external, H5Lcreate_soft, H5Ldelete, H5Lexists, H5Lget_name_by_idx,
    H5Lget_val, H5Lunpack_elink_val,
};
use hdf5_metno_sys::h5o::{H5Oclose, H5Oopen};
use hdf5_metno_sys::h5p::{
    H5Pclose, H5Pcreate, H5Pget_chunk, H5Pget_layout, H5Pset_chunk, H5P_CLS_DATASET_CREATE,
    H5P_DEFAULT,
};
use hdf5_metno_sys::h5s::{
    H5S_class_t, H5S_seloper_t, H5Sclose, H5Screate, H5Screate_simple, H5Sget_select_npoints,
    H5Sget_simple_extent_dims, H5Sget_simple_extent_ndims, H5Sget_simple_extent_type,
    H5Sselect_hyperslab, H5S_ALL,
};
use hdf5_metno_sys::h5t::{
    H5T_class_t, H5T_cset_t, H5T_sign_t, H5T_str_t, H5Tclose, H5Tcopy, H5Tcreate, H5Tget_class,
    H5Tget_member_class, H5Tget_member_name, H5Tget_nmembers, H5Tget_sign, H5Tget_size,
    H5Tinsert, H5Tis_variable_str, H5Tset_cset, H5Tset_size, H5Tset_strpad, H5T_C_S1,
    H5T_NATIVE_DOUBLE, H5T_NATIVE_FLOAT, H5T_NATIVE_INT16, H5T_NATIVE_INT32, H5T_NATIVE_INT64,
    H5T_NATIVE_INT8, H5T_NATIVE_UINT16, H5T_NATIVE_UINT32, H5T_NATIVE_UINT64, H5T_NATIVE_UINT8,
    H5T_VARIABLE,
};
use hdf5_metno_sys::LOCK;

use super::{
    CharacterSet, Extent, FileMode, HandleKind, Hid, LinkTarget, Layout, NativeType, ObjectKind,
    SpaceClass, Storage, StorageResult, StringPadding, StringSize, TypeClass,
};
use crate::error::StorageError;

/// Largest rank the library supports.
const MAX_RANK: usize = 32;

fn cstring(s: &str) -> StorageResult<CString> {
    CString::new(s).map_err(|_| StorageError::InvalidArgument(format!("'{s}' contains NUL")))
}

fn id(op: &'static str, id: hid_t) -> StorageResult<Hid> {
    if id < 0 {
        Err(StorageError::Library(op))
    } else {
        Ok(id)
    }
}

fn status(op: &'static str, status: herr_t) -> StorageResult<()> {
    if status < 0 {
        Err(StorageError::Library(op))
    } else {
        Ok(())
    }
}

fn tri(op: &'static str, value: htri_t) -> StorageResult<bool> {
    match value {
        v if v < 0 => Err(StorageError::Library(op)),
        0 => Ok(false),
        _ => Ok(true),
    }
}

fn class_of(op: &'static str, class: H5T_class_t) -> StorageResult<TypeClass> {
    Ok(match class {
        H5T_class_t::H5T_INTEGER => TypeClass::Integer,
        H5T_class_t::H5T_FLOAT => TypeClass::Float,
        H5T_class_t::H5T_TIME => TypeClass::Time,
        H5T_class_t::H5T_STRING => TypeClass::String,
        H5T_class_t::H5T_BITFIELD => TypeClass::BitField,
        H5T_class_t::H5T_OPAQUE => TypeClass::Opaque,
        H5T_class_t::H5T_COMPOUND => TypeClass::Compound,
        H5T_class_t::H5T_REFERENCE => TypeClass::Reference,
        H5T_class_t::H5T_ENUM => TypeClass::Enum,
        H5T_class_t::H5T_VLEN => TypeClass::VarLen,
        H5T_class_t::H5T_ARRAY => TypeClass::Array,
        _ => return Err(StorageError::Library(op)),
    })
}

/// Identifier closed on drop; used for library-internal temporaries.
struct Scoped {
    id: hid_t,
    close: unsafe extern "C" fn(hid_t) -> herr_t,
}

impl Drop for Scoped {
    fn drop(&mut self) {
        unsafe {
            (self.close)(self.id);
        }
    }
}

/// Read a name through the two-call size-then-fill protocol.
fn read_name(op: &'static str, fetch: impl Fn(*mut c_char, usize) -> isize) -> StorageResult<String> {
    let len = fetch(ptr::null_mut(), 0);
    if len < 0 {
        return Err(StorageError::Library(op));
    }
    let mut buf = vec![0u8; len as usize + 1];
    if fetch(buf.as_mut_ptr().cast(), buf.len()) < 0 {
        return Err(StorageError::Library(op));
    }
    buf.truncate(len as usize);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Copy library-owned C strings out of a variable-length read buffer.
fn copy_strings(pointers: &[*mut c_char]) -> Vec<Vec<u8>> {
    pointers
        .iter()
        .map(|&p| {
            if p.is_null() {
                Vec::new()
            } else {
                unsafe { CStr::from_ptr(p) }.to_bytes().to_vec()
            }
        })
        .collect()
}

/// Free the strings the library allocated for a variable-length read.
#[cfg(hdf5_1_12)]
fn reclaim(mem_type: hid_t, space: hid_t, pointers: &mut [*mut c_char]) -> StorageResult<()> {
    use hdf5_metno_sys::h5t::H5Treclaim;
    status("H5Treclaim", unsafe {
        H5Treclaim(mem_type, space, H5P_DEFAULT, pointers.as_mut_ptr().cast())
    })
}

#[cfg(not(hdf5_1_12))]
#[allow(deprecated)]
fn reclaim(mem_type: hid_t, space: hid_t, pointers: &mut [*mut c_char]) -> StorageResult<()> {
    use hdf5_metno_sys::h5d::H5Dvlen_reclaim;
    status("H5Dvlen_reclaim", unsafe {
        H5Dvlen_reclaim(mem_type, space, H5P_DEFAULT, pointers.as_mut_ptr().cast())
    })
}

/// Link type and, for soft and external links, the size of the stored value.
#[cfg(hdf5_1_12)]
fn link_info(group: hid_t, name: &CStr) -> StorageResult<(H5L_type_t, usize)> {
    use hdf5_metno_sys::h5l::{H5L_info2_t, H5Lget_info2};
    let mut info: H5L_info2_t = unsafe { std::mem::zeroed() };
    status("H5Lget_info2", unsafe {
        H5Lget_info2(group, name.as_ptr(), &mut info, H5P_DEFAULT)
    })?;
    let size = unsafe { *info.u.val_size() };
    Ok((info.type_, size))
}

#[cfg(not(hdf5_1_12))]
#[allow(deprecated)]
fn link_info(group: hid_t, name: &CStr) -> StorageResult<(H5L_type_t, usize)> {
    use hdf5_metno_sys::h5l::{H5L_info1_t, H5Lget_info1};
    let mut info: H5L_info1_t = unsafe { std::mem::zeroed() };
    status("H5Lget_info", unsafe {
        H5Lget_info1(group, name.as_ptr(), &mut info, H5P_DEFAULT)
    })?;
    let size = unsafe { *info.u.val_size() };
    Ok((info.type_, size))
}

/// `H5Aiterate2` callback appending each attribute name to a `Vec<String>`.
extern "C" fn push_attr_name(
    _location: hid_t,
    name: *const c_char,
    _info: *const H5A_info_t,
    data: *mut c_void,
) -> herr_t {
    // `data` is the `Vec<String>` passed by `attr_names`, exclusively borrowed for the call.
    let names = unsafe { &mut *data.cast::<Vec<String>>() };
    names.push(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned());
    0
}

/// The system HDF5 library.
#[derive(Debug)]
pub struct NativeStorage {
    _private: (),
}

impl NativeStorage {
    /// Initialise the library and silence its automatic error stack printing.
    pub fn new() -> StorageResult<Self> {
        let _lock = LOCK.lock();
        unsafe {
            status("H5open", H5open())?;
            status("H5Eset_auto2", H5Eset_auto2(H5E_DEFAULT, None, ptr::null_mut()))?;
        }
        Ok(NativeStorage { _private: () })
    }

    fn space_points(&self, space: hid_t) -> StorageResult<u64> {
        let n = unsafe { H5Sget_select_npoints(space) };
        if n < 0 {
            return Err(StorageError::Library("H5Sget_select_npoints"));
        }
        Ok(n as u64)
    }

    fn check_buffer(&self, points: u64, mem_type: hid_t, actual: usize) -> StorageResult<()> {
        let expected = points as usize * self.type_size(mem_type)?;
        if expected != actual {
            return Err(StorageError::BufferSize { expected, actual });
        }
        Ok(())
    }

    /// Points a dataset transfer moves: the memory selection, else the file
    /// selection, else the whole dataset.
    fn transfer_points(
        &self,
        dataset: hid_t,
        mem_space: Option<hid_t>,
        file_space: Option<hid_t>,
    ) -> StorageResult<u64> {
        match mem_space.or(file_space) {
            Some(space) => self.space_points(space),
            None => {
                let space = Scoped {
                    id: id("H5Dget_space", unsafe { H5Dget_space(dataset) })?,
                    close: H5Sclose,
                };
                self.space_points(space.id)
            }
        }
    }
}

impl Storage for NativeStorage {
    fn file_open(&self, path: &Path, mode: FileMode) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let display = path.display().to_string();
        let name = cstring(path.to_str().ok_or_else(|| StorageError::FileOpen(display.clone()))?)?;
        let flags = match mode {
            FileMode::ReadOnly => H5F_ACC_RDONLY,
            FileMode::ReadWrite => H5F_ACC_RDWR,
        };
        let file = unsafe { H5Fopen(name.as_ptr(), flags, H5P_DEFAULT) };
        if file < 0 {
            return Err(StorageError::FileOpen(display));
        }
        Ok(file)
    }

    fn file_create(&self, path: &Path) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let display = path.display().to_string();
        if path.exists() {
            return Err(StorageError::FileExists(display));
        }
        let name = cstring(path.to_str().ok_or_else(|| StorageError::FileOpen(display.clone()))?)?;
        let file = unsafe { H5Fcreate(name.as_ptr(), H5F_ACC_EXCL, H5P_DEFAULT, H5P_DEFAULT) };
        if file < 0 {
            return Err(StorageError::FileOpen(display));
        }
        Ok(file)
    }

    fn close(&self, kind: HandleKind, handle: Hid) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let (op, result) = unsafe {
            match kind {
                HandleKind::File => ("H5Fclose", H5Fclose(handle)),
                HandleKind::Group => ("H5Gclose", H5Gclose(handle)),
                HandleKind::Dataset => ("H5Dclose", H5Dclose(handle)),
                HandleKind::Attribute => ("H5Aclose", H5Aclose(handle)),
                HandleKind::Datatype => ("H5Tclose", H5Tclose(handle)),
                HandleKind::Dataspace => ("H5Sclose", H5Sclose(handle)),
                HandleKind::PropertyList => ("H5Pclose", H5Pclose(handle)),
                HandleKind::Object => ("H5Oclose", H5Oclose(handle)),
            }
        };
        status(op, result)
    }

    fn object_open(&self, loc: Hid, path: &str) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let name = cstring(path)?;
        let object = unsafe { H5Oopen(loc, name.as_ptr(), H5P_DEFAULT) };
        if object < 0 {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(object)
    }

    fn object_kind(&self, object: Hid) -> StorageResult<ObjectKind> {
        let _lock = LOCK.lock();
        Ok(match unsafe { H5Iget_type(object) } {
            H5I_type_t::H5I_GROUP => ObjectKind::Group,
            H5I_type_t::H5I_DATASET => ObjectKind::Dataset,
            H5I_type_t::H5I_DATATYPE => ObjectKind::NamedDatatype,
            H5I_type_t::H5I_BADID => return Err(StorageError::InvalidHandle(object)),
            _ => ObjectKind::Unknown,
        })
    }

    fn link_exists(&self, loc: Hid, path: &str) -> StorageResult<bool> {
        let _lock = LOCK.lock();
        let absolute = path.starts_with('/');
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Ok(absolute);
        }
        // Older libraries fail instead of answering when an intermediate group is missing.
        let mut prefix = String::new();
        for component in components {
            if absolute || !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            let name = cstring(&prefix)?;
            if !tri("H5Lexists", unsafe { H5Lexists(loc, name.as_ptr(), H5P_DEFAULT) })? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn link_delete(&self, loc: Hid, path: &str) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let name = cstring(path)?;
        status("H5Ldelete", unsafe { H5Ldelete(loc, name.as_ptr(), H5P_DEFAULT) })
    }

    fn link_names(&self, group: Hid) -> StorageResult<Vec<String>> {
        let _lock = LOCK.lock();
        let mut info = H5G_info_t::default();
        status("H5Gget_info", unsafe { H5Gget_info(group, &mut info) })?;
        let dot = cstring(".")?;
        (0..info.nlinks)
            .map(|n| {
                read_name("H5Lget_name_by_idx", |buf, size| unsafe {
                    H5Lget_name_by_idx(
                        group,
                        dot.as_ptr(),
                        H5_INDEX_NAME,
                        H5_ITER_INC,
                        n as hsize_t,
                        buf,
                        size,
                        H5P_DEFAULT,
                    ) as isize
                })
            })
            .collect()
    }

    fn link_target(&self, group: Hid, link: &str) -> StorageResult<LinkTarget> {
        let _lock = LOCK.lock();
        let name = cstring(link)?;
        let (kind, size) = link_info(group, &name)?;
        if matches!(kind, H5L_type_t::H5L_TYPE_HARD) {
            return Ok(LinkTarget::Hard);
        }

        let mut value = vec![0u8; size];
        status("H5Lget_val", unsafe {
            H5Lget_val(group, name.as_ptr(), value.as_mut_ptr().cast(), size, H5P_DEFAULT)
        })?;
        match kind {
            H5L_type_t::H5L_TYPE_SOFT => {
                let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
                Ok(LinkTarget::Soft {
                    target: String::from_utf8_lossy(&value[..end]).into_owned(),
                })
            }
            H5L_type_t::H5L_TYPE_EXTERNAL => {
                let mut flags: c_uint = 0;
                let mut file: *const c_char = ptr::null();
                let mut path: *const c_char = ptr::null();
                status("H5Lunpack_elink_val", unsafe {
                    H5Lunpack_elink_val(value.as_ptr().cast(), size, &mut flags, &mut file, &mut path)
                })?;
                if file.is_null() || path.is_null() {
                    return Err(StorageError::Library("H5Lunpack_elink_val"));
                }
                // Both pointers point into `value`.
                let (file, path) = unsafe {
                    (
                        CStr::from_ptr(file).to_string_lossy().into_owned(),
                        CStr::from_ptr(path).to_string_lossy().into_owned(),
                    )
                };
                Ok(LinkTarget::External { file, path, flags })
            }
            _ => Err(StorageError::InvalidArgument(format!(
                "link '{link}' has an unsupported type"
            ))),
        }
    }

    fn link_create_soft(&self, loc: Hid, path: &str, target: &str) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let (name, target) = (cstring(path)?, cstring(target)?);
        status("H5Lcreate_soft", unsafe {
            H5Lcreate_soft(target.as_ptr(), loc, name.as_ptr(), H5P_DEFAULT, H5P_DEFAULT)
        })
    }

    fn link_create_external(
        &self,
        loc: Hid,
        path: &str,
        file: &str,
        object: &str,
    ) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let (name, file, object) = (cstring(path)?, cstring(file)?, cstring(object)?);
        status("H5Lcreate_external", unsafe {
            H5Lcreate_external(
                file.as_ptr(),
                object.as_ptr(),
                loc,
                name.as_ptr(),
                H5P_DEFAULT,
                H5P_DEFAULT,
            )
        })
    }

    fn group_create(&self, loc: Hid, path: &str) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let name = cstring(path)?;
        id("H5Gcreate2", unsafe {
            H5Gcreate2(loc, name.as_ptr(), H5P_DEFAULT, H5P_DEFAULT, H5P_DEFAULT)
        })
    }

    fn dataset_create(
        &self,
        loc: Hid,
        path: &str,
        datatype: Hid,
        space: Hid,
        dcpl: Hid,
    ) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let name = cstring(path)?;
        let dcpl = if dcpl < 0 { H5P_DEFAULT } else { dcpl };
        id("H5Dcreate2", unsafe {
            H5Dcreate2(loc, name.as_ptr(), datatype, space, H5P_DEFAULT, dcpl, H5P_DEFAULT)
        })
    }

    fn dataset_type(&self, dataset: Hid) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Dget_type", unsafe { H5Dget_type(dataset) })
    }

    fn dataset_space(&self, dataset: Hid) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Dget_space", unsafe { H5Dget_space(dataset) })
    }

    fn dataset_create_plist(&self, dataset: Hid) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Dget_create_plist", unsafe { H5Dget_create_plist(dataset) })
    }

    fn dataset_read(
        &self,
        dataset: Hid,
        mem_type: Hid,
        mem_space: Option<Hid>,
        file_space: Option<Hid>,
        buf: &mut [u8],
    ) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let points = self.transfer_points(dataset, mem_space, file_space)?;
        self.check_buffer(points, mem_type, buf.len())?;
        status("H5Dread", unsafe {
            H5Dread(
                dataset,
                mem_type,
                mem_space.unwrap_or(H5S_ALL),
                file_space.unwrap_or(H5S_ALL),
                H5P_DEFAULT,
                buf.as_mut_ptr().cast(),
            )
        })
    }

    fn dataset_read_var_strings(&self, dataset: Hid, mem_type: Hid) -> StorageResult<Vec<Vec<u8>>> {
        let _lock = LOCK.lock();
        let space = Scoped {
            id: id("H5Dget_space", unsafe { H5Dget_space(dataset) })?,
            close: H5Sclose,
        };
        let mut pointers: Vec<*mut c_char> = vec![ptr::null_mut(); self.space_points(space.id)? as usize];
        status("H5Dread", unsafe {
            H5Dread(
                dataset,
                mem_type,
                H5S_ALL,
                H5S_ALL,
                H5P_DEFAULT,
                pointers.as_mut_ptr().cast(),
            )
        })?;
        let strings = copy_strings(&pointers);
        reclaim(mem_type, space.id, &mut pointers)?;
        Ok(strings)
    }

    fn dataset_write(&self, dataset: Hid, mem_type: Hid, buf: &[u8]) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let points = self.transfer_points(dataset, None, None)?;
        self.check_buffer(points, mem_type, buf.len())?;
        status("H5Dwrite", unsafe {
            H5Dwrite(dataset, mem_type, H5S_ALL, H5S_ALL, H5P_DEFAULT, buf.as_ptr().cast())
        })
    }

    fn type_native(&self, native: NativeType) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let base = match native {
            NativeType::Int8 => *H5T_NATIVE_INT8,
            NativeType::Int16 => *H5T_NATIVE_INT16,
            NativeType::Int32 => *H5T_NATIVE_INT32,
            NativeType::Int64 => *H5T_NATIVE_INT64,
            NativeType::UInt8 => *H5T_NATIVE_UINT8,
            NativeType::UInt16 => *H5T_NATIVE_UINT16,
            NativeType::UInt32 => *H5T_NATIVE_UINT32,
            NativeType::UInt64 => *H5T_NATIVE_UINT64,
            NativeType::Float => *H5T_NATIVE_FLOAT,
            NativeType::Double => *H5T_NATIVE_DOUBLE,
        };
        id("H5Tcopy", unsafe { H5Tcopy(base) })
    }

    fn type_string(
        &self,
        size: StringSize,
        padding: StringPadding,
        charset: CharacterSet,
    ) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let datatype = Scoped {
            id: id("H5Tcopy", unsafe { H5Tcopy(*H5T_C_S1) })?,
            close: H5Tclose,
        };
        let size = match size {
            StringSize::Fixed(n) => n,
            StringSize::Variable => H5T_VARIABLE,
        };
        let pad = match padding {
            StringPadding::NullTerminate => H5T_str_t::H5T_STR_NULLTERM,
            StringPadding::NullPad => H5T_str_t::H5T_STR_NULLPAD,
            StringPadding::SpacePad => H5T_str_t::H5T_STR_SPACEPAD,
        };
        let cset = match charset {
            CharacterSet::Ascii => H5T_cset_t::H5T_CSET_ASCII,
            CharacterSet::Utf8 => H5T_cset_t::H5T_CSET_UTF8,
        };
        unsafe {
            status("H5Tset_size", H5Tset_size(datatype.id, size))?;
            status("H5Tset_strpad", H5Tset_strpad(datatype.id, pad))?;
            status("H5Tset_cset", H5Tset_cset(datatype.id, cset))?;
        }
        let datatype = std::mem::ManuallyDrop::new(datatype);
        Ok(datatype.id)
    }

    fn type_compound(&self, size: usize) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Tcreate", unsafe { H5Tcreate(H5T_class_t::H5T_COMPOUND, size) })
    }

    fn type_insert(&self, compound: Hid, name: &str, offset: usize, member: Hid) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let name = cstring(name)?;
        status("H5Tinsert", unsafe { H5Tinsert(compound, name.as_ptr(), offset, member) })
    }

    fn type_class(&self, datatype: Hid) -> StorageResult<TypeClass> {
        let _lock = LOCK.lock();
        class_of("H5Tget_class", unsafe { H5Tget_class(datatype) })
    }

    fn type_size(&self, datatype: Hid) -> StorageResult<usize> {
        let _lock = LOCK.lock();
        match unsafe { H5Tget_size(datatype) } {
            0 => Err(StorageError::Library("H5Tget_size")),
            n => Ok(n),
        }
    }

    fn type_is_signed(&self, datatype: Hid) -> StorageResult<bool> {
        let _lock = LOCK.lock();
        match unsafe { H5Tget_sign(datatype) } {
            H5T_sign_t::H5T_SGN_2 => Ok(true),
            H5T_sign_t::H5T_SGN_NONE => Ok(false),
            _ => Err(StorageError::Library("H5Tget_sign")),
        }
    }

    fn type_is_variable_str(&self, datatype: Hid) -> StorageResult<bool> {
        let _lock = LOCK.lock();
        tri("H5Tis_variable_str", unsafe { H5Tis_variable_str(datatype) })
    }

    fn type_member_count(&self, compound: Hid) -> StorageResult<usize> {
        let _lock = LOCK.lock();
        let n = unsafe { H5Tget_nmembers(compound) };
        if n < 0 {
            return Err(StorageError::Library("H5Tget_nmembers"));
        }
        Ok(n as usize)
    }

    fn type_member_name(&self, compound: Hid, index: usize) -> StorageResult<String> {
        let _lock = LOCK.lock();
        let raw = unsafe { H5Tget_member_name(compound, index as c_uint) };
        if raw.is_null() {
            return Err(StorageError::Library("H5Tget_member_name"));
        }
        let name = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        unsafe {
            H5free_memory(raw.cast::<c_void>());
        }
        Ok(name)
    }

    fn type_member_class(&self, compound: Hid, index: usize) -> StorageResult<TypeClass> {
        let _lock = LOCK.lock();
        class_of("H5Tget_member_class", unsafe {
            H5Tget_member_class(compound, index as c_uint)
        })
    }

    fn space_scalar(&self) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Screate", unsafe { H5Screate(H5S_class_t::H5S_SCALAR) })
    }

    fn space_simple(&self, dims: &[u64], max_dims: Option<&[u64]>) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        if dims.is_empty() || dims.len() > MAX_RANK {
            return Err(StorageError::InvalidArgument(format!("rank {}", dims.len())));
        }
        if max_dims.is_some_and(|m| m.len() != dims.len()) {
            return Err(StorageError::InvalidArgument(
                "maximum extent rank differs from extent rank".into(),
            ));
        }
        let max = max_dims.map_or(ptr::null(), <[u64]>::as_ptr);
        id("H5Screate_simple", unsafe {
            H5Screate_simple(dims.len() as c_int, dims.as_ptr(), max)
        })
    }

    fn space_class(&self, space: Hid) -> StorageResult<SpaceClass> {
        let _lock = LOCK.lock();
        match unsafe { H5Sget_simple_extent_type(space) } {
            H5S_class_t::H5S_SCALAR => Ok(SpaceClass::Scalar),
            H5S_class_t::H5S_SIMPLE => Ok(SpaceClass::Simple),
            H5S_class_t::H5S_NULL => Ok(SpaceClass::Null),
            _ => Err(StorageError::Library("H5Sget_simple_extent_type")),
        }
    }

    fn space_extent(&self, space: Hid) -> StorageResult<Extent> {
        let _lock = LOCK.lock();
        let rank = unsafe { H5Sget_simple_extent_ndims(space) };
        if rank < 0 {
            return Err(StorageError::Library("H5Sget_simple_extent_ndims"));
        }
        let mut dims = vec![0 as hsize_t; rank as usize];
        let mut max_dims = vec![0 as hsize_t; rank as usize];
        if rank > 0 {
            let got = unsafe {
                H5Sget_simple_extent_dims(space, dims.as_mut_ptr(), max_dims.as_mut_ptr())
            };
            if got < 0 {
                return Err(StorageError::Library("H5Sget_simple_extent_dims"));
            }
        }
        Ok(Extent { dims, max_dims })
    }

    fn space_select_hyperslab(
        &self,
        space: Hid,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
    ) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let rank = self.space_extent(space)?.rank();
        if start.len() != rank || stride.len() != rank || count.len() != rank {
            return Err(StorageError::InvalidArgument(format!(
                "hyperslab rank does not match dataspace rank {rank}"
            )));
        }
        status("H5Sselect_hyperslab", unsafe {
            H5Sselect_hyperslab(
                space,
                H5S_seloper_t::H5S_SELECT_SET,
                start.as_ptr(),
                stride.as_ptr(),
                count.as_ptr(),
                ptr::null(),
            )
        })
    }

    fn space_selected_points(&self, space: Hid) -> StorageResult<u64> {
        let _lock = LOCK.lock();
        self.space_points(space)
    }

    fn attr_names(&self, object: Hid) -> StorageResult<Vec<String>> {
        let _lock = LOCK.lock();
        let mut names: Vec<String> = Vec::new();
        status("H5Aiterate2", unsafe {
            H5Aiterate2(
                object,
                H5_INDEX_NAME,
                H5_ITER_INC,
                ptr::null_mut(),
                Some(push_attr_name),
                (&mut names as *mut Vec<String>).cast(),
            )
        })?;
        Ok(names)
    }

    fn attr_open(&self, object: Hid, name: &str) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let cname = cstring(name)?;
        let attr = unsafe { H5Aopen(object, cname.as_ptr(), H5P_DEFAULT) };
        if attr < 0 {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(attr)
    }

    fn attr_exists(&self, object: Hid, name: &str) -> StorageResult<bool> {
        let _lock = LOCK.lock();
        let name = cstring(name)?;
        tri("H5Aexists", unsafe { H5Aexists(object, name.as_ptr()) })
    }

    fn attr_delete(&self, object: Hid, name: &str) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let name = cstring(name)?;
        status("H5Adelete", unsafe { H5Adelete(object, name.as_ptr()) })
    }

    fn attr_create(&self, object: Hid, name: &str, datatype: Hid, space: Hid) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        let name = cstring(name)?;
        id("H5Acreate2", unsafe {
            H5Acreate2(object, name.as_ptr(), datatype, space, H5P_DEFAULT, H5P_DEFAULT)
        })
    }

    fn attr_type(&self, attr: Hid) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Aget_type", unsafe { H5Aget_type(attr) })
    }

    fn attr_space(&self, attr: Hid) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Aget_space", unsafe { H5Aget_space(attr) })
    }

    fn attr_read(&self, attr: Hid, mem_type: Hid, buf: &mut [u8]) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let space = Scoped {
            id: id("H5Aget_space", unsafe { H5Aget_space(attr) })?,
            close: H5Sclose,
        };
        self.check_buffer(self.space_points(space.id)?, mem_type, buf.len())?;
        status("H5Aread", unsafe { H5Aread(attr, mem_type, buf.as_mut_ptr().cast()) })
    }

    fn attr_read_var_strings(&self, attr: Hid, mem_type: Hid) -> StorageResult<Vec<Vec<u8>>> {
        let _lock = LOCK.lock();
        let space = Scoped {
            id: id("H5Aget_space", unsafe { H5Aget_space(attr) })?,
            close: H5Sclose,
        };
        let mut pointers: Vec<*mut c_char> = vec![ptr::null_mut(); self.space_points(space.id)? as usize];
        status("H5Aread", unsafe { H5Aread(attr, mem_type, pointers.as_mut_ptr().cast()) })?;
        let strings = copy_strings(&pointers);
        reclaim(mem_type, space.id, &mut pointers)?;
        Ok(strings)
    }

    fn attr_write(&self, attr: Hid, mem_type: Hid, buf: &[u8]) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let space = Scoped {
            id: id("H5Aget_space", unsafe { H5Aget_space(attr) })?,
            close: H5Sclose,
        };
        self.check_buffer(self.space_points(space.id)?, mem_type, buf.len())?;
        status("H5Awrite", unsafe { H5Awrite(attr, mem_type, buf.as_ptr().cast()) })
    }

    fn attr_write_var_strings(&self, attr: Hid, mem_type: Hid, values: &[&str]) -> StorageResult<()> {
        let _lock = LOCK.lock();
        let space = Scoped {
            id: id("H5Aget_space", unsafe { H5Aget_space(attr) })?,
            close: H5Sclose,
        };
        let points = self.space_points(space.id)? as usize;
        if points != values.len() {
            return Err(StorageError::BufferSize {
                expected: points,
                actual: values.len(),
            });
        }
        let owned = values
            .iter()
            .map(|v| cstring(v))
            .collect::<StorageResult<Vec<_>>>()?;
        let pointers: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        status("H5Awrite", unsafe { H5Awrite(attr, mem_type, pointers.as_ptr().cast()) })
    }

    fn plist_dataset_create(&self) -> StorageResult<Hid> {
        let _lock = LOCK.lock();
        id("H5Pcreate", unsafe { H5Pcreate(*H5P_CLS_DATASET_CREATE) })
    }

    fn plist_set_chunk(&self, plist: Hid, dims: &[u64]) -> StorageResult<()> {
        let _lock = LOCK.lock();
        if dims.is_empty() || dims.contains(&0) {
            return Err(StorageError::InvalidArgument(
                "chunk dimensions must be positive".into(),
            ));
        }
        status("H5Pset_chunk", unsafe {
            H5Pset_chunk(plist, dims.len() as c_int, dims.as_ptr())
        })
    }

    fn plist_layout(&self, plist: Hid) -> StorageResult<Layout> {
        let _lock = LOCK.lock();
        match unsafe { H5Pget_layout(plist) } {
            H5D_layout_t::H5D_COMPACT => Ok(Layout::Compact),
            H5D_layout_t::H5D_CONTIGUOUS => Ok(Layout::Contiguous),
            H5D_layout_t::H5D_CHUNKED => Ok(Layout::Chunked),
            H5D_layout_t::H5D_LAYOUT_ERROR | H5D_layout_t::H5D_NLAYOUTS => {
                Err(StorageError::Library("H5Pget_layout"))
            }
            #[allow(unreachable_patterns)]
            _ => Ok(Layout::Virtual),
        }
    }

    fn plist_chunk(&self, plist: Hid) -> StorageResult<Vec<u64>> {
        let _lock = LOCK.lock();
        if self.plist_layout(plist)? != Layout::Chunked {
            return Err(StorageError::InvalidArgument("layout is not chunked".into()));
        }
        let mut dims = vec![0 as hsize_t; MAX_RANK];
        let rank = unsafe { H5Pget_chunk(plist, MAX_RANK as c_int, dims.as_mut_ptr()) };
        if rank < 0 {
            return Err(StorageError::Library("H5Pget_chunk"));
        }
        dims.truncate(rank as usize);
        Ok(dims)
    }
}
