//! Native symbol table and call wrappers.
//!
//! All entry points of the engine's C library interface are resolved once at
//! load time into an immutable table of typed function pointers. Calls that
//! are datatype-polymorphic on the native side (`lammps_extract_*` return
//! `void *`) stay `*mut c_void` here and are interpreted per call through the
//! typed helpers below, so no shape is ever rebound on shared state.
//!
//! # Thread Safety
//!
//! The engine is not reentrant. The table itself is immutable and cheap to
//! clone; serialization of calls against one handle is enforced by the
//! `!Send`/`!Sync` handle type in `engine.rs`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::Arc;

use libloading::Library;
use tracing::warn;

use super::view::{RowView, RowViewMut};
use super::{BigInt, ImageInt, RawHandle, TagInt, ERROR_BUF_LEN, NAME_BUF_LEN, OS_INFO_BUF_LEN};
use crate::error::{Error, Result};

/// Native representation width of the host MPI communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommWidth {
    /// `MPI_Comm` is a C `int` (MPICH family).
    Int,
    /// `MPI_Comm` is a pointer (Open MPI family).
    Pointer,
}

impl CommWidth {
    /// Size of the native representation in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Int => std::mem::size_of::<c_int>(),
            Self::Pointer => std::mem::size_of::<*mut c_void>(),
        }
    }
}

/// Raw signature of the external force callback registered with the engine.
pub type ExternalRawFn =
    unsafe extern "C" fn(*mut c_void, BigInt, c_int, *mut TagInt, *mut *mut f64, *mut *mut f64);

type OpenCommIntFn =
    unsafe extern "C" fn(c_int, *mut *mut c_char, c_int, *mut *mut c_void) -> *mut c_void;
type OpenCommPtrFn =
    unsafe extern "C" fn(c_int, *mut *mut c_char, *mut c_void, *mut *mut c_void) -> *mut c_void;
type OpenNoMpiFn = unsafe extern "C" fn(c_int, *mut *mut c_char, *mut *mut c_void) -> *mut c_void;
type CloseFn = unsafe extern "C" fn(RawHandle);
type VoidFn = unsafe extern "C" fn();
type FreeFn = unsafe extern "C" fn(*mut c_void);
type TextFn = unsafe extern "C" fn(RawHandle, *const c_char);
type CommandFn = unsafe extern "C" fn(RawHandle, *const c_char) -> *const c_char;
type CommandsListFn = unsafe extern "C" fn(RawHandle, c_int, *mut *const c_char);
type NatomsFn = unsafe extern "C" fn(RawHandle) -> f64;
type ExtractBoxFn = unsafe extern "C" fn(
    RawHandle,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut c_int,
    *mut c_int,
);
type ResetBoxFn = unsafe extern "C" fn(RawHandle, *mut f64, *mut f64, f64, f64, f64);
type ThermoFn = unsafe extern "C" fn(RawHandle, *const c_char) -> f64;
type NameIntFn = unsafe extern "C" fn(RawHandle, *const c_char) -> c_int;
type NamePtrFn = unsafe extern "C" fn(RawHandle, *const c_char) -> *mut c_void;
type ExtractComputeFn =
    unsafe extern "C" fn(RawHandle, *const c_char, c_int, c_int) -> *mut c_void;
type ExtractFixFn =
    unsafe extern "C" fn(RawHandle, *const c_char, c_int, c_int, c_int, c_int) -> *mut c_void;
type ExtractVariableFn =
    unsafe extern "C" fn(RawHandle, *const c_char, *const c_char) -> *mut c_void;
type SetVariableFn = unsafe extern "C" fn(RawHandle, *const c_char, *const c_char) -> c_int;
type GatherFn = unsafe extern "C" fn(RawHandle, *const c_char, c_int, c_int, *mut c_void);
type GatherSubsetFn =
    unsafe extern "C" fn(RawHandle, *const c_char, c_int, c_int, c_int, *const c_int, *mut c_void);
type CreateAtomsFn = unsafe extern "C" fn(
    RawHandle,
    c_int,
    *const TagInt,
    *const c_int,
    *const f64,
    *const f64,
    *const ImageInt,
    c_int,
) -> c_int;
type EncodeImageFn = unsafe extern "C" fn(c_int, c_int, c_int) -> ImageInt;
type DecodeImageFn = unsafe extern "C" fn(ImageInt, *mut c_int);
type HandleIntFn = unsafe extern "C" fn(RawHandle) -> c_int;
type HandleVoidFn = unsafe extern "C" fn(RawHandle);
type OsInfoFn = unsafe extern "C" fn(*mut c_char, c_int);
type LastErrorFn = unsafe extern "C" fn(RawHandle, *mut c_char, c_int) -> c_int;
type ConfigFlagFn = unsafe extern "C" fn() -> c_int;
type PackageNameFn = unsafe extern "C" fn(c_int, *mut c_char, c_int) -> c_int;
type AcceleratorFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> c_int;
type HasStyleFn = unsafe extern "C" fn(RawHandle, *const c_char, *const c_char) -> c_int;
type StyleNameFn =
    unsafe extern "C" fn(RawHandle, *const c_char, c_int, *mut c_char, c_int) -> c_int;
type PluginNameFn = unsafe extern "C" fn(c_int, *mut c_char, *mut c_char, c_int) -> c_int;
type SetCallbackFn = unsafe extern "C" fn(RawHandle, *const c_char, ExternalRawFn, *mut c_void);
type FindPairNeighFn =
    unsafe extern "C" fn(RawHandle, *const c_char, c_int, c_int, c_int) -> c_int;
type FindNeighFn = unsafe extern "C" fn(RawHandle, *const c_char, c_int) -> c_int;
type NeighNumFn = unsafe extern "C" fn(RawHandle, c_int) -> c_int;
type NeighElemFn =
    unsafe extern "C" fn(RawHandle, c_int, c_int, *mut c_int, *mut c_int, *mut *mut c_int);

macro_rules! bind {
    ($lib:expr, $sym:literal) => {{
        // SAFETY: the symbol type is fixed by the field this lands in; the
        // engine's C interface is the external contract these types mirror.
        let symbol = unsafe { $lib.get($sym) };
        *symbol.map_err(|e| {
            Error::initialization(format!(
                "missing engine symbol {}: {e}",
                String::from_utf8_lossy($sym)
            ))
        })?
    }};
}

/// Immutable table of engine entry points, bound once per library image.
#[derive(Clone)]
pub struct EngineApi {
    // Keeps the loaded image alive as long as any clone of the table exists.
    pub(super) _lib: Option<Arc<Library>>,

    pub(super) open_comm_int: OpenCommIntFn,
    pub(super) open_comm_ptr: OpenCommPtrFn,
    pub(super) open_no_mpi: OpenNoMpiFn,
    pub(super) close: CloseFn,
    pub(super) finalize: VoidFn,
    pub(super) free: FreeFn,

    pub(super) file: TextFn,
    pub(super) command: CommandFn,
    pub(super) commands_list: CommandsListFn,
    pub(super) commands_string: TextFn,

    pub(super) get_natoms: NatomsFn,
    pub(super) extract_box: ExtractBoxFn,
    pub(super) reset_box: ResetBoxFn,
    pub(super) get_thermo: ThermoFn,
    pub(super) extract_setting: NameIntFn,
    pub(super) extract_global_datatype: NameIntFn,
    pub(super) extract_global: NamePtrFn,
    pub(super) extract_atom_datatype: NameIntFn,
    pub(super) extract_atom: NamePtrFn,
    pub(super) extract_compute: ExtractComputeFn,
    pub(super) extract_fix: ExtractFixFn,
    pub(super) extract_variable: ExtractVariableFn,
    pub(super) set_variable: SetVariableFn,

    pub(super) gather_atoms: GatherFn,
    pub(super) gather_atoms_concat: GatherFn,
    pub(super) gather_atoms_subset: GatherSubsetFn,
    pub(super) scatter_atoms: GatherFn,
    pub(super) scatter_atoms_subset: GatherSubsetFn,
    pub(super) gather: GatherFn,
    pub(super) gather_concat: GatherFn,
    pub(super) gather_subset: GatherSubsetFn,
    pub(super) scatter: GatherFn,
    pub(super) scatter_subset: GatherSubsetFn,
    pub(super) create_atoms: CreateAtomsFn,
    pub(super) encode_image_flags: EncodeImageFn,
    pub(super) decode_image_flags: DecodeImageFn,

    pub(super) version: HandleIntFn,
    pub(super) get_os_info: OsInfoFn,
    pub(super) get_mpi_comm: HandleIntFn,
    pub(super) is_running: HandleIntFn,
    pub(super) force_timeout: HandleVoidFn,
    pub(super) has_error: HandleIntFn,
    pub(super) get_last_error_message: LastErrorFn,

    pub(super) config_has_mpi_support: ConfigFlagFn,
    pub(super) config_has_exceptions: ConfigFlagFn,
    pub(super) config_has_gzip_support: ConfigFlagFn,
    pub(super) config_has_png_support: ConfigFlagFn,
    pub(super) config_has_jpeg_support: ConfigFlagFn,
    pub(super) config_has_ffmpeg_support: ConfigFlagFn,
    pub(super) config_package_count: ConfigFlagFn,
    pub(super) config_package_name: PackageNameFn,
    pub(super) config_accelerator: AcceleratorFn,
    pub(super) has_style: HasStyleFn,
    pub(super) style_count: NameIntFn,
    pub(super) style_name: StyleNameFn,
    pub(super) has_id: HasStyleFn,
    pub(super) id_count: NameIntFn,
    pub(super) id_name: StyleNameFn,
    pub(super) plugin_count: ConfigFlagFn,
    pub(super) plugin_name: PluginNameFn,

    pub(super) set_fix_external_callback: SetCallbackFn,

    pub(super) find_pair_neighlist: FindPairNeighFn,
    pub(super) find_fix_neighlist: FindNeighFn,
    pub(super) find_compute_neighlist: FindNeighFn,
    pub(super) neighlist_num_elements: NeighNumFn,
    pub(super) neighlist_element_neighbors: NeighElemFn,
}

/// Box parameters as received from the native `lammps_extract_box` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBox {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
    pub xy: f64,
    pub yz: f64,
    pub xz: f64,
    pub periodicity: [c_int; 3],
    pub box_change: c_int,
}

/// Selector for the gather entry-point family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherOp {
    Atoms,
    AtomsConcat,
    General,
    GeneralConcat,
}

/// Selector for the scatter/subset entry-point families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOp {
    Atoms,
    General,
}

impl EngineApi {
    /// Resolve every entry point from a freshly loaded library image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] naming the first missing symbol.
    pub fn bind(lib: Library) -> Result<Self> {
        let api = Self {
            open_comm_int: bind!(lib, b"lammps_open\0"),
            open_comm_ptr: bind!(lib, b"lammps_open\0"),
            open_no_mpi: bind!(lib, b"lammps_open_no_mpi\0"),
            close: bind!(lib, b"lammps_close\0"),
            finalize: bind!(lib, b"lammps_finalize\0"),
            free: bind!(lib, b"lammps_free\0"),
            file: bind!(lib, b"lammps_file\0"),
            command: bind!(lib, b"lammps_command\0"),
            commands_list: bind!(lib, b"lammps_commands_list\0"),
            commands_string: bind!(lib, b"lammps_commands_string\0"),
            get_natoms: bind!(lib, b"lammps_get_natoms\0"),
            extract_box: bind!(lib, b"lammps_extract_box\0"),
            reset_box: bind!(lib, b"lammps_reset_box\0"),
            get_thermo: bind!(lib, b"lammps_get_thermo\0"),
            extract_setting: bind!(lib, b"lammps_extract_setting\0"),
            extract_global_datatype: bind!(lib, b"lammps_extract_global_datatype\0"),
            extract_global: bind!(lib, b"lammps_extract_global\0"),
            extract_atom_datatype: bind!(lib, b"lammps_extract_atom_datatype\0"),
            extract_atom: bind!(lib, b"lammps_extract_atom\0"),
            extract_compute: bind!(lib, b"lammps_extract_compute\0"),
            extract_fix: bind!(lib, b"lammps_extract_fix\0"),
            extract_variable: bind!(lib, b"lammps_extract_variable\0"),
            set_variable: bind!(lib, b"lammps_set_variable\0"),
            gather_atoms: bind!(lib, b"lammps_gather_atoms\0"),
            gather_atoms_concat: bind!(lib, b"lammps_gather_atoms_concat\0"),
            gather_atoms_subset: bind!(lib, b"lammps_gather_atoms_subset\0"),
            scatter_atoms: bind!(lib, b"lammps_scatter_atoms\0"),
            scatter_atoms_subset: bind!(lib, b"lammps_scatter_atoms_subset\0"),
            gather: bind!(lib, b"lammps_gather\0"),
            gather_concat: bind!(lib, b"lammps_gather_concat\0"),
            gather_subset: bind!(lib, b"lammps_gather_subset\0"),
            scatter: bind!(lib, b"lammps_scatter\0"),
            scatter_subset: bind!(lib, b"lammps_scatter_subset\0"),
            create_atoms: bind!(lib, b"lammps_create_atoms\0"),
            encode_image_flags: bind!(lib, b"lammps_encode_image_flags\0"),
            decode_image_flags: bind!(lib, b"lammps_decode_image_flags\0"),
            version: bind!(lib, b"lammps_version\0"),
            get_os_info: bind!(lib, b"lammps_get_os_info\0"),
            get_mpi_comm: bind!(lib, b"lammps_get_mpi_comm\0"),
            is_running: bind!(lib, b"lammps_is_running\0"),
            force_timeout: bind!(lib, b"lammps_force_timeout\0"),
            has_error: bind!(lib, b"lammps_has_error\0"),
            get_last_error_message: bind!(lib, b"lammps_get_last_error_message\0"),
            config_has_mpi_support: bind!(lib, b"lammps_config_has_mpi_support\0"),
            config_has_exceptions: bind!(lib, b"lammps_config_has_exceptions\0"),
            config_has_gzip_support: bind!(lib, b"lammps_config_has_gzip_support\0"),
            config_has_png_support: bind!(lib, b"lammps_config_has_png_support\0"),
            config_has_jpeg_support: bind!(lib, b"lammps_config_has_jpeg_support\0"),
            config_has_ffmpeg_support: bind!(lib, b"lammps_config_has_ffmpeg_support\0"),
            config_package_count: bind!(lib, b"lammps_config_package_count\0"),
            config_package_name: bind!(lib, b"lammps_config_package_name\0"),
            config_accelerator: bind!(lib, b"lammps_config_accelerator\0"),
            has_style: bind!(lib, b"lammps_has_style\0"),
            style_count: bind!(lib, b"lammps_style_count\0"),
            style_name: bind!(lib, b"lammps_style_name\0"),
            has_id: bind!(lib, b"lammps_has_id\0"),
            id_count: bind!(lib, b"lammps_id_count\0"),
            id_name: bind!(lib, b"lammps_id_name\0"),
            plugin_count: bind!(lib, b"lammps_plugin_count\0"),
            plugin_name: bind!(lib, b"lammps_plugin_name\0"),
            set_fix_external_callback: bind!(lib, b"lammps_set_fix_external_callback\0"),
            find_pair_neighlist: bind!(lib, b"lammps_find_pair_neighlist\0"),
            find_fix_neighlist: bind!(lib, b"lammps_find_fix_neighlist\0"),
            find_compute_neighlist: bind!(lib, b"lammps_find_compute_neighlist\0"),
            neighlist_num_elements: bind!(lib, b"lammps_neighlist_num_elements\0"),
            neighlist_element_neighbors: bind!(lib, b"lammps_neighlist_element_neighbors\0"),
            _lib: None,
        };
        Ok(Self {
            _lib: Some(Arc::new(lib)),
            ..api
        })
    }

    // ---------------------------------------------------------------------
    // lifecycle

    /// Create an engine instance without an explicit communicator.
    pub fn open_serial(&self, args: &[String]) -> Result<RawHandle> {
        let (argc, _storage, mut argv) = marshal_args(args)?;
        let argv_ptr = if argv.is_empty() {
            ptr::null_mut()
        } else {
            argv.as_mut_ptr()
        };
        // SAFETY: argv holds argc valid NUL-terminated strings backed by
        // _storage, which outlives the call; the engine copies what it needs.
        let raw = unsafe { (self.open_no_mpi)(argc, argv_ptr, ptr::null_mut()) };
        Ok(raw)
    }

    /// Create an engine instance bound to a caller-supplied communicator.
    ///
    /// The communicator value is passed with the width the caller declared;
    /// width validation against the engine build happens in `engine.rs`
    /// before this is reached.
    pub fn open_with_comm(&self, args: &[String], comm: u64, width: CommWidth) -> Result<RawHandle> {
        let (argc, _storage, mut argv) = marshal_args(args)?;
        let argv_ptr = if argv.is_empty() {
            ptr::null_mut()
        } else {
            argv.as_mut_ptr()
        };
        // SAFETY: same argv contract as open_serial. The communicator is
        // passed through the variant matching its declared native width, so
        // the calling convention agrees with the engine build.
        let raw = unsafe {
            match width {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                CommWidth::Int => {
                    (self.open_comm_int)(argc, argv_ptr, comm as c_int, ptr::null_mut())
                }
                CommWidth::Pointer => {
                    (self.open_comm_ptr)(argc, argv_ptr, comm as usize as *mut c_void, ptr::null_mut())
                }
            }
        };
        Ok(raw)
    }

    /// Destroy an engine instance.
    pub fn close_handle(&self, raw: RawHandle) {
        // SAFETY: raw came from a successful open and is destroyed at most
        // once; engine.rs nulls its copy immediately after this call.
        unsafe { (self.close)(raw) }
    }

    /// Shut down the engine's MPI subsystem. Process-wide and one-way.
    pub fn finalize_process(&self) {
        // SAFETY: no handle involved; the engine tolerates repeated calls.
        unsafe { (self.finalize)() }
    }

    // ---------------------------------------------------------------------
    // commands

    pub fn run_file(&self, raw: RawHandle, path: &CStr) {
        // SAFETY: raw is an open handle, path a valid NUL-terminated string.
        unsafe { (self.file)(raw, path.as_ptr()) }
    }

    pub fn run_command(&self, raw: RawHandle, cmd: &CStr) {
        // SAFETY: as run_file. The echoed command name the engine returns
        // points into engine-owned storage and is deliberately ignored.
        let _echo = unsafe { (self.command)(raw, cmd.as_ptr()) };
    }

    pub fn run_commands_list(&self, raw: RawHandle, cmds: &[CString]) {
        let mut argv: Vec<*const c_char> = cmds.iter().map(|c| c.as_ptr()).collect();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let argc = cmds.len() as c_int;
        // SAFETY: argv holds argc pointers into cmds, which outlives the call.
        unsafe { (self.commands_list)(raw, argc, argv.as_mut_ptr()) }
    }

    pub fn run_commands_string(&self, raw: RawHandle, block: &CStr) {
        // SAFETY: as run_file.
        unsafe { (self.commands_string)(raw, block.as_ptr()) }
    }

    // ---------------------------------------------------------------------
    // state queries

    pub fn natoms(&self, raw: RawHandle) -> f64 {
        // SAFETY: raw is an open handle.
        unsafe { (self.get_natoms)(raw) }
    }

    pub fn box_params(&self, raw: RawHandle) -> RawBox {
        let mut out = RawBox::default();
        // SAFETY: all output pointers address live stack storage of the
        // exact shapes the engine writes (two 3-vectors, three scalars, one
        // 3-vector of ints, one int).
        unsafe {
            (self.extract_box)(
                raw,
                out.lo.as_mut_ptr(),
                out.hi.as_mut_ptr(),
                &mut out.xy,
                &mut out.yz,
                &mut out.xz,
                out.periodicity.as_mut_ptr(),
                &mut out.box_change,
            );
        }
        out
    }

    pub fn set_box(&self, raw: RawHandle, lo: [f64; 3], hi: [f64; 3], xy: f64, yz: f64, xz: f64) {
        let mut lo = lo;
        let mut hi = hi;
        // SAFETY: lo/hi are 3-element arrays matching the native shape.
        unsafe { (self.reset_box)(raw, lo.as_mut_ptr(), hi.as_mut_ptr(), xy, yz, xz) }
    }

    pub fn thermo(&self, raw: RawHandle, name: &CStr) -> f64 {
        // SAFETY: raw is an open handle, name valid.
        unsafe { (self.get_thermo)(raw, name.as_ptr()) }
    }

    pub fn setting(&self, raw: RawHandle, name: &CStr) -> i32 {
        // SAFETY: as thermo.
        unsafe { (self.extract_setting)(raw, name.as_ptr()) }
    }

    pub fn global_datatype(&self, raw: RawHandle, name: &CStr) -> i32 {
        // SAFETY: as thermo.
        unsafe { (self.extract_global_datatype)(raw, name.as_ptr()) }
    }

    pub fn atom_datatype(&self, raw: RawHandle, name: &CStr) -> i32 {
        // SAFETY: as thermo.
        unsafe { (self.extract_atom_datatype)(raw, name.as_ptr()) }
    }

    /// Copy a global property out as `len` values of `T`.
    ///
    /// `None` when the keyword is unknown (native NULL).
    pub fn global_vec<T: Copy>(&self, raw: RawHandle, name: &CStr, len: usize) -> Option<Vec<T>> {
        // SAFETY: as thermo; the returned pointer is either NULL or
        // engine-owned storage of at least len elements of the datatype the
        // caller established via global_datatype.
        let p = unsafe { (self.extract_global)(raw, name.as_ptr()) };
        if p.is_null() {
            return None;
        }
        // SAFETY: non-null per above; T matches the engine datatype tag.
        Some(unsafe { slice::from_raw_parts(p.cast::<T>(), len).to_vec() })
    }

    /// Copy a string-valued global property.
    pub fn global_str(&self, raw: RawHandle, name: &CStr) -> Option<String> {
        // SAFETY: as global_vec; for string-tagged keywords the pointer is a
        // NUL-terminated engine-owned string.
        let p = unsafe { (self.extract_global)(raw, name.as_ptr()) };
        if p.is_null() {
            return None;
        }
        // SAFETY: non-null and NUL-terminated per the string datatype tag.
        Some(unsafe { CStr::from_ptr(p.cast::<c_char>()) }
            .to_string_lossy()
            .into_owned())
    }

    /// Borrow a 1-D per-atom array of `len` values of `T`.
    pub fn atom_slice<T>(&self, raw: RawHandle, name: &CStr, len: usize) -> Option<&[T]> {
        // SAFETY: as thermo.
        let p = unsafe { (self.extract_atom)(raw, name.as_ptr()) };
        if p.is_null() {
            return None;
        }
        // SAFETY: engine per-atom storage is dimensioned for at least len
        // (nmax) elements; the borrow is tied to &self, which the handle
        // owns, so it cannot outlive the engine instance.
        Some(unsafe { slice::from_raw_parts(p.cast::<T>(), len) })
    }

    /// Borrow a 2-D per-atom table of `nrows × ncols` values of `T`.
    pub fn atom_rows<T>(
        &self,
        raw: RawHandle,
        name: &CStr,
        nrows: usize,
        ncols: usize,
    ) -> Option<RowView<'_, T>> {
        // SAFETY: as thermo.
        let p = unsafe { (self.extract_atom)(raw, name.as_ptr()) };
        if p.is_null() {
            return None;
        }
        // SAFETY: for 2-D tagged keywords the pointer is an array of nrows
        // row pointers with ncols columns each; borrow tied to &self.
        Some(unsafe { RowView::from_raw(p.cast::<*mut T>(), nrows, ncols) })
    }

    pub fn compute_ptr(&self, raw: RawHandle, id: &CStr, style: i32, kind: i32) -> *mut c_void {
        // SAFETY: raw is an open handle, id valid; the result is interpreted
        // by the typed helpers below according to (style, kind).
        unsafe { (self.extract_compute)(raw, id.as_ptr(), style, kind) }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn fix_ptr(
        &self,
        raw: RawHandle,
        id: &CStr,
        style: i32,
        kind: i32,
        nrow: i32,
        ncol: i32,
    ) -> *mut c_void {
        // SAFETY: as compute_ptr.
        unsafe { (self.extract_fix)(raw, id.as_ptr(), style, kind, nrow, ncol) }
    }

    pub fn variable_ptr(&self, raw: RawHandle, name: &CStr, group: Option<&CStr>) -> *mut c_void {
        let group_ptr = group.map_or(ptr::null(), CStr::as_ptr);
        // SAFETY: raw is an open handle; NULL group means the default group
        // by the engine's convention.
        unsafe { (self.extract_variable)(raw, name.as_ptr(), group_ptr) }
    }

    pub fn assign_variable(&self, raw: RawHandle, name: &CStr, value: &CStr) -> i32 {
        // SAFETY: raw is an open handle, both strings valid.
        unsafe { (self.set_variable)(raw, name.as_ptr(), value.as_ptr()) }
    }

    // ---------------------------------------------------------------------
    // typed interpretation of polymorphic results

    /// Read one `f64` behind a polymorphic result pointer.
    pub fn deref_f64(&self, p: *mut c_void) -> Option<f64> {
        if p.is_null() {
            return None;
        }
        // SAFETY: caller established the double datatype for this pointer.
        Some(unsafe { *p.cast::<f64>() })
    }

    /// Read one `i32` behind a polymorphic result pointer.
    pub fn deref_i32(&self, p: *mut c_void) -> Option<i32> {
        if p.is_null() {
            return None;
        }
        // SAFETY: caller established the int datatype for this pointer.
        Some(unsafe { *p.cast::<c_int>() })
    }

    /// Copy `len` doubles behind a polymorphic result pointer.
    pub fn copy_f64_slice(&self, p: *mut c_void, len: usize) -> Option<Vec<f64>> {
        if p.is_null() {
            return None;
        }
        // SAFETY: caller queried len from the engine before this call.
        Some(unsafe { slice::from_raw_parts(p.cast::<f64>(), len) }.to_vec())
    }

    /// Copy a `double **` table into a flat row-major vector.
    pub fn copy_f64_rows(&self, p: *mut c_void, rows: usize, cols: usize) -> Option<Vec<f64>> {
        if p.is_null() {
            return None;
        }
        let mut out = Vec::with_capacity(rows * cols);
        // SAFETY: caller queried rows/cols from the engine; each row pointer
        // addresses cols doubles.
        unsafe {
            let table = p.cast::<*mut f64>();
            for i in 0..rows {
                out.extend_from_slice(slice::from_raw_parts(*table.add(i), cols));
            }
        }
        Some(out)
    }

    /// Take ownership of an engine-allocated `double`, copy it, release it.
    pub fn take_f64(&self, p: *mut c_void) -> Option<f64> {
        let owned = OwnedNative::new(self, p)?;
        Some(owned.read_f64(0))
    }

    /// Take ownership of an engine-allocated `double` array of `len`,
    /// copy it, release it.
    pub fn take_f64_vec(&self, p: *mut c_void, len: usize) -> Option<Vec<f64>> {
        let owned = OwnedNative::new(self, p)?;
        Some((0..len).map(|i| owned.read_f64(i)).collect())
    }

    // ---------------------------------------------------------------------
    // gather / scatter / create

    pub fn gather_i32(&self, raw: RawHandle, op: GatherOp, name: &CStr, width: i32, count: usize) -> Vec<i32> {
        let mut out = vec![0 as c_int; count];
        let f = match op {
            GatherOp::Atoms => self.gather_atoms,
            GatherOp::AtomsConcat => self.gather_atoms_concat,
            GatherOp::General => self.gather,
            GatherOp::GeneralConcat => self.gather_concat,
        };
        // SAFETY: out holds exactly count ints, the size the engine fills
        // for an int-kind gather of this width.
        unsafe { f(raw, name.as_ptr(), 0, width, out.as_mut_ptr().cast()) };
        out
    }

    pub fn gather_f64(&self, raw: RawHandle, op: GatherOp, name: &CStr, width: i32, count: usize) -> Vec<f64> {
        let mut out = vec![0.0f64; count];
        let f = match op {
            GatherOp::Atoms => self.gather_atoms,
            GatherOp::AtomsConcat => self.gather_atoms_concat,
            GatherOp::General => self.gather,
            GatherOp::GeneralConcat => self.gather_concat,
        };
        // SAFETY: as gather_i32, double kind.
        unsafe { f(raw, name.as_ptr(), 1, width, out.as_mut_ptr().cast()) };
        out
    }

    pub fn gather_subset_i32(&self, raw: RawHandle, op: TargetOp, name: &CStr, width: i32, ids: &[c_int]) -> Vec<i32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let ndata = ids.len() as c_int;
        let mut out = vec![0 as c_int; ids.len() * width.unsigned_abs() as usize];
        let f = match op {
            TargetOp::Atoms => self.gather_atoms_subset,
            TargetOp::General => self.gather_subset,
        };
        // SAFETY: out holds width×ndata ints and ids holds ndata element IDs.
        unsafe { f(raw, name.as_ptr(), 0, width, ndata, ids.as_ptr(), out.as_mut_ptr().cast()) };
        out
    }

    pub fn gather_subset_f64(&self, raw: RawHandle, op: TargetOp, name: &CStr, width: i32, ids: &[c_int]) -> Vec<f64> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let ndata = ids.len() as c_int;
        let mut out = vec![0.0f64; ids.len() * width.unsigned_abs() as usize];
        let f = match op {
            TargetOp::Atoms => self.gather_atoms_subset,
            TargetOp::General => self.gather_subset,
        };
        // SAFETY: as gather_subset_i32, double kind.
        unsafe { f(raw, name.as_ptr(), 1, width, ndata, ids.as_ptr(), out.as_mut_ptr().cast()) };
        out
    }

    pub fn scatter_i32(&self, raw: RawHandle, op: TargetOp, name: &CStr, width: i32, data: &[i32]) {
        let f = match op {
            TargetOp::Atoms => self.scatter_atoms,
            TargetOp::General => self.scatter,
        };
        // SAFETY: the marshaling layer validated data length = width×count
        // before this call; the engine only reads from the buffer.
        unsafe { f(raw, name.as_ptr(), 0, width, data.as_ptr().cast_mut().cast()) };
    }

    pub fn scatter_f64(&self, raw: RawHandle, op: TargetOp, name: &CStr, width: i32, data: &[f64]) {
        let f = match op {
            TargetOp::Atoms => self.scatter_atoms,
            TargetOp::General => self.scatter,
        };
        // SAFETY: as scatter_i32.
        unsafe { f(raw, name.as_ptr(), 1, width, data.as_ptr().cast_mut().cast()) };
    }

    pub fn scatter_subset_i32(&self, raw: RawHandle, op: TargetOp, name: &CStr, width: i32, ids: &[c_int], data: &[i32]) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let ndata = ids.len() as c_int;
        let f = match op {
            TargetOp::Atoms => self.scatter_atoms_subset,
            TargetOp::General => self.scatter_subset,
        };
        // SAFETY: validated as scatter_i32, with ndata matching ids.
        unsafe { f(raw, name.as_ptr(), 0, width, ndata, ids.as_ptr(), data.as_ptr().cast_mut().cast()) };
    }

    pub fn scatter_subset_f64(&self, raw: RawHandle, op: TargetOp, name: &CStr, width: i32, ids: &[c_int], data: &[f64]) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let ndata = ids.len() as c_int;
        let f = match op {
            TargetOp::Atoms => self.scatter_atoms_subset,
            TargetOp::General => self.scatter_subset,
        };
        // SAFETY: as scatter_subset_i32.
        unsafe { f(raw, name.as_ptr(), 1, width, ndata, ids.as_ptr(), data.as_ptr().cast_mut().cast()) };
    }

    /// Invoke the native atom constructor. Slices are already validated to
    /// exact lengths (`n` / `3n`) by the marshaling layer.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        raw: RawHandle,
        n: i32,
        ids: Option<&[TagInt]>,
        types: &[c_int],
        x: &[f64],
        v: Option<&[f64]>,
        image: Option<&[ImageInt]>,
        shrink_exceed: bool,
    ) -> i32 {
        let id_ptr = ids.map_or(ptr::null(), <[TagInt]>::as_ptr);
        let v_ptr = v.map_or(ptr::null(), <[f64]>::as_ptr);
        let img_ptr = image.map_or(ptr::null(), <[ImageInt]>::as_ptr);
        // SAFETY: all non-null pointers address slices of the lengths the
        // engine expects for n atoms; NULL marks an omitted optional field.
        unsafe {
            (self.create_atoms)(
                raw,
                n,
                id_ptr,
                types.as_ptr(),
                x.as_ptr(),
                v_ptr,
                img_ptr,
                c_int::from(shrink_exceed),
            )
        }
    }

    pub fn encode_image(&self, ix: i32, iy: i32, iz: i32) -> ImageInt {
        // SAFETY: pure computation on the native side, no handle involved.
        unsafe { (self.encode_image_flags)(ix, iy, iz) }
    }

    pub fn decode_image(&self, image: ImageInt) -> [i32; 3] {
        let mut flags = [0 as c_int; 3];
        // SAFETY: flags is the 3-int output shape the engine writes.
        unsafe { (self.decode_image_flags)(image, flags.as_mut_ptr()) };
        flags
    }

    // ---------------------------------------------------------------------
    // info / error state

    pub fn engine_version(&self, raw: RawHandle) -> i32 {
        // SAFETY: raw is an open handle.
        unsafe { (self.version)(raw) }
    }

    pub fn os_info(&self) -> String {
        let mut buf = vec![0u8; OS_INFO_BUF_LEN];
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: buf holds OS_INFO_BUF_LEN bytes and the engine
        // NUL-terminates within the given length.
        unsafe {
            (self.get_os_info)(buf.as_mut_ptr().cast(), OS_INFO_BUF_LEN as c_int);
        }
        cbuf_to_string(&buf)
    }

    pub fn mpi_comm_f(&self, raw: RawHandle) -> i32 {
        // SAFETY: raw is an open handle.
        unsafe { (self.get_mpi_comm)(raw) }
    }

    pub fn running(&self, raw: RawHandle) -> bool {
        // SAFETY: raw is an open handle.
        unsafe { (self.is_running)(raw) == 1 }
    }

    pub fn request_timeout(&self, raw: RawHandle) {
        // SAFETY: raw is an open handle; the signal is advisory.
        unsafe { (self.force_timeout)(raw) }
    }

    pub fn error_flag(&self, raw: RawHandle) -> bool {
        // SAFETY: raw is an open handle.
        unsafe { (self.has_error)(raw) != 0 }
    }

    /// Fetch and classify the last error: `(discriminant, message)`.
    pub fn last_error(&self, raw: RawHandle) -> (i32, String) {
        let mut buf = vec![0u8; ERROR_BUF_LEN];
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: buf holds ERROR_BUF_LEN bytes; the engine bounds the copy
        // and NUL-terminates.
        let kind = unsafe {
            (self.get_last_error_message)(raw, buf.as_mut_ptr().cast(), ERROR_BUF_LEN as c_int)
        };
        (kind, cbuf_to_string(&buf))
    }

    pub fn mpi_support(&self) -> i32 {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_has_mpi_support)() }
    }

    pub fn exceptions_enabled(&self) -> bool {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_has_exceptions)() != 0 }
    }

    pub fn gzip_enabled(&self) -> bool {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_has_gzip_support)() != 0 }
    }

    pub fn png_enabled(&self) -> bool {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_has_png_support)() != 0 }
    }

    pub fn jpeg_enabled(&self) -> bool {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_has_jpeg_support)() != 0 }
    }

    pub fn ffmpeg_enabled(&self) -> bool {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_has_ffmpeg_support)() != 0 }
    }

    pub fn package_count(&self) -> i32 {
        // SAFETY: build-config query, no handle.
        unsafe { (self.config_package_count)() }
    }

    pub fn package_name(&self, idx: i32) -> String {
        let mut buf = vec![0u8; NAME_BUF_LEN];
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: buf holds NAME_BUF_LEN bytes; bounded, NUL-terminated.
        unsafe {
            (self.config_package_name)(idx, buf.as_mut_ptr().cast(), NAME_BUF_LEN as c_int);
        }
        cbuf_to_string(&buf)
    }

    pub fn accelerator(&self, package: &CStr, category: &CStr, setting: &CStr) -> bool {
        // SAFETY: build-config query with three valid strings.
        unsafe { (self.config_accelerator)(package.as_ptr(), category.as_ptr(), setting.as_ptr()) != 0 }
    }

    pub fn style_present(&self, raw: RawHandle, category: &CStr, name: &CStr) -> bool {
        // SAFETY: raw is an open handle, both strings valid.
        unsafe { (self.has_style)(raw, category.as_ptr(), name.as_ptr()) != 0 }
    }

    pub fn styles_in(&self, raw: RawHandle, category: &CStr) -> i32 {
        // SAFETY: as style_present.
        unsafe { (self.style_count)(raw, category.as_ptr()) }
    }

    pub fn style_at(&self, raw: RawHandle, category: &CStr, idx: i32) -> String {
        let mut buf = vec![0u8; NAME_BUF_LEN];
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: buf is NAME_BUF_LEN bytes; bounded, NUL-terminated.
        unsafe {
            (self.style_name)(raw, category.as_ptr(), idx, buf.as_mut_ptr().cast(), NAME_BUF_LEN as c_int);
        }
        cbuf_to_string(&buf)
    }

    pub fn id_present(&self, raw: RawHandle, category: &CStr, name: &CStr) -> bool {
        // SAFETY: as style_present.
        unsafe { (self.has_id)(raw, category.as_ptr(), name.as_ptr()) != 0 }
    }

    pub fn ids_in(&self, raw: RawHandle, category: &CStr) -> i32 {
        // SAFETY: as style_present.
        unsafe { (self.id_count)(raw, category.as_ptr()) }
    }

    pub fn id_at(&self, raw: RawHandle, category: &CStr, idx: i32) -> String {
        let mut buf = vec![0u8; NAME_BUF_LEN];
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: as style_at.
        unsafe {
            (self.id_name)(raw, category.as_ptr(), idx, buf.as_mut_ptr().cast(), NAME_BUF_LEN as c_int);
        }
        cbuf_to_string(&buf)
    }

    pub fn plugins(&self) -> i32 {
        // SAFETY: build-config query, no handle.
        unsafe { (self.plugin_count)() }
    }

    pub fn plugin_at(&self, idx: i32) -> (String, String) {
        let mut style = vec![0u8; NAME_BUF_LEN];
        let mut name = vec![0u8; NAME_BUF_LEN];
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: both buffers are NAME_BUF_LEN bytes; bounded writes.
        unsafe {
            (self.plugin_name)(
                idx,
                style.as_mut_ptr().cast(),
                name.as_mut_ptr().cast(),
                NAME_BUF_LEN as c_int,
            );
        }
        (cbuf_to_string(&style), cbuf_to_string(&name))
    }

    // ---------------------------------------------------------------------
    // external callback

    /// Register the trampoline for a fix-external hook. The slot pointer
    /// must stay valid until the hook is replaced or the handle closed;
    /// `engine.rs` owns the slot boxes.
    pub fn register_external(&self, raw: RawHandle, fix_id: &CStr, slot: *mut ExternalSlot) {
        // SAFETY: raw is an open handle; the trampoline only runs while the
        // engine is inside a run, during which the slot box is kept alive.
        unsafe {
            (self.set_fix_external_callback)(raw, fix_id.as_ptr(), external_trampoline, slot.cast());
        }
    }

    // ---------------------------------------------------------------------
    // neighbor lists

    pub fn pair_neighlist(&self, raw: RawHandle, style: &CStr, exact: bool, nsub: i32, request: i32) -> i32 {
        // SAFETY: raw is an open handle, style valid.
        unsafe { (self.find_pair_neighlist)(raw, style.as_ptr(), c_int::from(exact), nsub, request) }
    }

    pub fn fix_neighlist(&self, raw: RawHandle, id: &CStr, request: i32) -> i32 {
        // SAFETY: as pair_neighlist.
        unsafe { (self.find_fix_neighlist)(raw, id.as_ptr(), request) }
    }

    pub fn compute_neighlist(&self, raw: RawHandle, id: &CStr, request: i32) -> i32 {
        // SAFETY: as pair_neighlist.
        unsafe { (self.find_compute_neighlist)(raw, id.as_ptr(), request) }
    }

    pub fn neighlist_len(&self, raw: RawHandle, idx: i32) -> i32 {
        // SAFETY: raw is an open handle.
        unsafe { (self.neighlist_num_elements)(raw, idx) }
    }

    /// `(atom index, borrowed neighbor indices)` for one list element.
    pub fn neighlist_entry(&self, raw: RawHandle, idx: i32, element: i32) -> Option<(i32, &[i32])> {
        let mut iatom: c_int = -1;
        let mut numneigh: c_int = 0;
        let mut neighbors: *mut c_int = ptr::null_mut();
        // SAFETY: output pointers address live stack storage; the engine
        // fills them or leaves iatom negative for an invalid element.
        unsafe {
            (self.neighlist_element_neighbors)(
                raw,
                idx,
                element,
                &mut iatom,
                &mut numneigh,
                &mut neighbors,
            );
        }
        if iatom < 0 || neighbors.is_null() {
            return None;
        }
        // SAFETY: neighbors addresses numneigh ints owned by the engine;
        // the borrow is tied to &self.
        let list = unsafe { slice::from_raw_parts(neighbors, numneigh.unsigned_abs() as usize) };
        Some((iatom, list))
    }
}

/// Scoped owner of an engine-allocated result pointer.
///
/// Copy the content out, then drop; the drop releases the buffer through
/// the engine's `free` entry point on every exit path.
pub struct OwnedNative<'api> {
    ptr: *mut c_void,
    api: &'api EngineApi,
}

impl<'api> OwnedNative<'api> {
    /// Wrap a potentially-NULL engine allocation.
    pub fn new(api: &'api EngineApi, ptr: *mut c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self { ptr, api })
        }
    }

    /// Read the `i`-th double of the allocation.
    pub fn read_f64(&self, i: usize) -> f64 {
        // SAFETY: ptr is non-null per new(); the caller sized i from the
        // length query that preceded the allocating call.
        unsafe { *self.ptr.cast::<f64>().add(i) }
    }
}

impl Drop for OwnedNative<'_> {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated by the engine for this caller and is
        // released exactly once, here.
        unsafe { (self.api.free)(self.ptr) }
    }
}

/// Heap slot holding a registered external-force hook.
pub struct ExternalSlot {
    pub hook: Box<dyn FnMut(BigInt, &[TagInt], RowView<'_, f64>, &mut RowViewMut<'_, f64>)>,
}

unsafe extern "C" fn external_trampoline(
    ctx: *mut c_void,
    timestep: BigInt,
    nlocal: c_int,
    tag: *mut TagInt,
    x: *mut *mut f64,
    fext: *mut *mut f64,
) {
    // A panic must not unwind across the C boundary into the engine.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let n = nlocal.unsigned_abs() as usize;
        // SAFETY: ctx is the ExternalSlot box registered alongside this
        // trampoline; the engine passes it back verbatim.
        let slot = unsafe { &mut *ctx.cast::<ExternalSlot>() };
        // SAFETY: the engine guarantees tag/x/fext address nlocal entries
        // (3 columns for the coordinate and force tables) for the duration
        // of this call only; the views do not escape the hook.
        let (tags, xs, mut fs) = unsafe {
            (
                slice::from_raw_parts(tag.cast_const(), n),
                RowView::from_raw(x.cast_const(), n, 3),
                RowViewMut::from_raw(fext.cast_const(), n, 3),
            )
        };
        (slot.hook)(timestep, tags, xs, &mut fs);
    }));
    if outcome.is_err() {
        warn!("external force callback panicked; suppressed at FFI boundary");
    }
}

/// Build the `argv` triple for the open entry points: the engine expects
/// the executable name first, like a `main()` argument vector.
fn marshal_args(args: &[String]) -> Result<(c_int, Vec<CString>, Vec<*mut c_char>)> {
    if args.is_empty() {
        return Ok((0, Vec::new(), Vec::new()));
    }
    let mut storage = Vec::with_capacity(args.len() + 1);
    storage.push(super::cstring("lammps")?);
    for arg in args {
        storage.push(super::cstring(arg)?);
    }
    let argv: Vec<*mut c_char> = storage.iter().map(|c| c.as_ptr().cast_mut()).collect();
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let argc = storage.len() as c_int;
    Ok((argc, storage, argv))
}

fn cbuf_to_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}
