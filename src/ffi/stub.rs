//! In-process fake engine for unit tests.
//!
//! Implements every entry point of the native interface against a heap
//! [`StubState`] addressed by the opaque handle, with call counters and a
//! scriptable error flag, so the marshaling layers can be tested without a
//! native library on the machine.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]
// The documented-contract discipline applies to real engine calls; this
// file fakes the other side of that contract for tests.
#![allow(clippy::undocumented_unsafe_blocks)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
// Tests mutate the fake engine through the same shared handle the calls use.
#![allow(clippy::mut_from_ref)]

use std::cell::Cell;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Mutex;

use super::api::{EngineApi, ExternalRawFn};
use super::{BigInt, ImageInt, RawHandle, TagInt};

/// Observable state of one fake engine instance.
pub struct StubState {
    pub closed: u32,
    pub finalized: u32,
    pub files: Vec<String>,
    pub commands: Vec<String>,
    pub command_blocks: Vec<String>,
    pub command_lists: Vec<Vec<String>>,
    pub natoms: f64,
    pub nlocal: i32,
    pub nmax: i32,
    pub thermo_calls: u32,
    pub gather_calls: u32,
    pub scatter_calls: u32,
    pub scattered: Vec<f64>,
    pub create_calls: u32,
    pub created: i32,
    pub free_calls: u32,
    pub timeout_requests: u32,
    pub reset_box_calls: u32,
    pub has_error: bool,
    pub error_kind: i32,
    pub error_message: String,
    pub set_variables: Vec<(String, String)>,
    pub boxlo: [f64; 3],
    pub boxhi: [f64; 3],
    pub tilt: [f64; 3],
    pub periodicity: [c_int; 3],
    pub box_change: c_int,
    // per-atom backing storage; x_rows points into positions and must not
    // be rebuilt after handing the handle out
    pub dt: f64,
    pub ntimestep: i64,
    pub units: &'static CStr,
    pub positions: Vec<f64>,
    pub x_rows: Vec<*mut f64>,
    pub types: Vec<c_int>,
    pub tags: Vec<TagInt>,
    pub compute_scalar: f64,
    pub compute_vector: Vec<f64>,
    pub compute_vector_len: c_int,
    pub variable_equal: f64,
    pub external: Option<(ExternalRawFn, *mut c_void)>,
    pub neigh_first: Vec<c_int>,
    pub neigh_second: Vec<c_int>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            closed: 0,
            finalized: 0,
            files: Vec::new(),
            commands: Vec::new(),
            command_blocks: Vec::new(),
            command_lists: Vec::new(),
            natoms: 4.0,
            nlocal: 4,
            nmax: 4,
            thermo_calls: 0,
            gather_calls: 0,
            scatter_calls: 0,
            scattered: Vec::new(),
            create_calls: 0,
            created: 0,
            free_calls: 0,
            timeout_requests: 0,
            reset_box_calls: 0,
            has_error: false,
            error_kind: 0,
            error_message: String::new(),
            set_variables: Vec::new(),
            boxlo: [0.0; 3],
            boxhi: [10.0; 3],
            tilt: [0.0; 3],
            periodicity: [1, 1, 0],
            box_change: 0,
            dt: 0.005,
            ntimestep: 100,
            units: c"lj",
            positions: (0..12).map(f64::from).collect(),
            x_rows: Vec::new(),
            types: vec![1, 1, 2, 2],
            tags: vec![1, 2, 3, 4],
            compute_scalar: 1.5,
            compute_vector: vec![1.0, 2.0, 3.0],
            compute_vector_len: 3,
            variable_equal: 42.0,
            external: None,
            neigh_first: vec![1, 2],
            neigh_second: vec![0],
        }
    }
}

// Engine-allocated buffers handed to the marshaling layer, keyed by address
// so stub_free can find the owner and credit the release.
struct AllocRecord {
    addr: usize,
    owner: usize,
    _data: Vec<f64>,
}

static ALLOCS: Mutex<Vec<AllocRecord>> = Mutex::new(Vec::new());

thread_local! {
    static CURRENT: Cell<*mut StubState> = const { Cell::new(ptr::null_mut()) };
}

fn state(raw: RawHandle) -> &'static mut StubState {
    // Test-only shortcut: handles produced by StubEngine stay alive for the
    // whole test and each test runs on its own thread.
    unsafe { &mut *raw.cast::<StubState>() }
}

fn alloc(owner: *mut StubState, values: &[f64]) -> *mut f64 {
    let data = values.to_vec();
    let addr = data.as_ptr() as usize;
    ALLOCS.lock().unwrap().push(AllocRecord {
        addr,
        owner: owner as usize,
        _data: data,
    });
    addr as *mut f64
}

fn take_str(p: *const c_char) -> String {
    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
}

fn put_str(buf: *mut c_char, cap: c_int, text: &str) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(cap.unsigned_abs() as usize - 1);
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), buf, n);
        *buf.add(n) = 0;
    }
}

// ---------------------------------------------------------------------------
// lifecycle

unsafe extern "C" fn stub_open_comm_int(
    _argc: c_int,
    _argv: *mut *mut c_char,
    _comm: c_int,
    _ptr: *mut *mut c_void,
) -> *mut c_void {
    CURRENT.with(|c| c.get()).cast()
}

unsafe extern "C" fn stub_open_comm_ptr(
    _argc: c_int,
    _argv: *mut *mut c_char,
    _comm: *mut c_void,
    _ptr: *mut *mut c_void,
) -> *mut c_void {
    CURRENT.with(|c| c.get()).cast()
}

unsafe extern "C" fn stub_open_no_mpi(
    _argc: c_int,
    _argv: *mut *mut c_char,
    _ptr: *mut *mut c_void,
) -> *mut c_void {
    CURRENT.with(|c| c.get()).cast()
}

unsafe extern "C" fn stub_close(raw: RawHandle) {
    state(raw).closed += 1;
}

unsafe extern "C" fn stub_finalize() {
    let raw = CURRENT.with(|c| c.get());
    if !raw.is_null() {
        unsafe { (*raw).finalized += 1 };
    }
}

unsafe extern "C" fn stub_free(p: *mut c_void) {
    let mut allocs = ALLOCS.lock().unwrap();
    if let Some(i) = allocs.iter().position(|r| r.addr == p as usize) {
        let rec = allocs.swap_remove(i);
        unsafe { (*(rec.owner as *mut StubState)).free_calls += 1 };
    }
}

// ---------------------------------------------------------------------------
// commands

unsafe extern "C" fn stub_file(raw: RawHandle, path: *const c_char) {
    state(raw).files.push(take_str(path));
}

unsafe extern "C" fn stub_command(raw: RawHandle, cmd: *const c_char) -> *const c_char {
    let st = state(raw);
    let text = take_str(cmd);
    if text.starts_with("fail") {
        st.has_error = true;
        st.error_kind = 1;
        st.error_message = format!("unknown command: {text}");
    }
    st.commands.push(text);
    cmd
}

unsafe extern "C" fn stub_commands_list(raw: RawHandle, n: c_int, cmds: *mut *const c_char) {
    let list = (0..n.unsigned_abs() as usize)
        .map(|i| take_str(unsafe { *cmds.add(i) }))
        .collect();
    state(raw).command_lists.push(list);
}

unsafe extern "C" fn stub_commands_string(raw: RawHandle, block: *const c_char) {
    state(raw).command_blocks.push(take_str(block));
}

// ---------------------------------------------------------------------------
// state queries

unsafe extern "C" fn stub_get_natoms(raw: RawHandle) -> f64 {
    state(raw).natoms
}

#[allow(clippy::similar_names)]
unsafe extern "C" fn stub_extract_box(
    raw: RawHandle,
    lo: *mut f64,
    hi: *mut f64,
    xy: *mut f64,
    yz: *mut f64,
    xz: *mut f64,
    periodicity: *mut c_int,
    box_change: *mut c_int,
) {
    let st = state(raw);
    unsafe {
        ptr::copy_nonoverlapping(st.boxlo.as_ptr(), lo, 3);
        ptr::copy_nonoverlapping(st.boxhi.as_ptr(), hi, 3);
        *xy = st.tilt[0];
        *yz = st.tilt[1];
        *xz = st.tilt[2];
        ptr::copy_nonoverlapping(st.periodicity.as_ptr(), periodicity, 3);
        *box_change = st.box_change;
    }
}

#[allow(clippy::similar_names)]
unsafe extern "C" fn stub_reset_box(
    raw: RawHandle,
    lo: *mut f64,
    hi: *mut f64,
    xy: f64,
    yz: f64,
    xz: f64,
) {
    let st = state(raw);
    unsafe {
        ptr::copy_nonoverlapping(lo, st.boxlo.as_mut_ptr(), 3);
        ptr::copy_nonoverlapping(hi, st.boxhi.as_mut_ptr(), 3);
    }
    st.tilt = [xy, yz, xz];
    st.reset_box_calls += 1;
}

unsafe extern "C" fn stub_get_thermo(raw: RawHandle, name: *const c_char) -> f64 {
    state(raw).thermo_calls += 1;
    match take_str(name).as_str() {
        "temp" => 1.5,
        "pe" => -6.25,
        "step" => state(raw).ntimestep as f64,
        _ => 0.0,
    }
}

unsafe extern "C" fn stub_extract_setting(raw: RawHandle, name: *const c_char) -> c_int {
    let st = state(raw);
    match take_str(name).as_str() {
        "bigint" => 8,
        "tagint" | "imageint" => 4,
        "nlocal" => st.nlocal,
        "nmax" => st.nmax,
        "world_size" => 1,
        _ => -1,
    }
}

unsafe extern "C" fn stub_global_datatype(_raw: RawHandle, name: *const c_char) -> c_int {
    match take_str(name).as_str() {
        "dt" | "boxlo" | "boxhi" => 2,
        "ntimestep" => 4,
        "units" => 6,
        _ => -1,
    }
}

unsafe extern "C" fn stub_extract_global(raw: RawHandle, name: *const c_char) -> *mut c_void {
    let st = state(raw);
    match take_str(name).as_str() {
        "dt" => ptr::from_mut(&mut st.dt).cast(),
        "boxlo" => st.boxlo.as_mut_ptr().cast(),
        "boxhi" => st.boxhi.as_mut_ptr().cast(),
        "ntimestep" => ptr::from_mut(&mut st.ntimestep).cast(),
        "units" => st.units.as_ptr().cast_mut().cast(),
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn stub_atom_datatype(_raw: RawHandle, name: *const c_char) -> c_int {
    match take_str(name).as_str() {
        "type" | "tag" => 0,
        "x" => 3,
        _ => -1,
    }
}

unsafe extern "C" fn stub_extract_atom(raw: RawHandle, name: *const c_char) -> *mut c_void {
    let st = state(raw);
    match take_str(name).as_str() {
        "type" => st.types.as_mut_ptr().cast(),
        "tag" => st.tags.as_mut_ptr().cast(),
        "x" => st.x_rows.as_mut_ptr().cast(),
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn stub_extract_compute(
    raw: RawHandle,
    id: *const c_char,
    style: c_int,
    kind: c_int,
) -> *mut c_void {
    let st = state(raw);
    if take_str(id) != "c1" {
        return ptr::null_mut();
    }
    match (style, kind) {
        // global scalar / vector, plus the vector-length size query
        (0, 0) => ptr::from_mut(&mut st.compute_scalar).cast(),
        (0, 1) => st.compute_vector.as_mut_ptr().cast(),
        (0, 3) => ptr::from_mut(&mut st.compute_vector_len).cast(),
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn stub_extract_fix(
    raw: RawHandle,
    id: *const c_char,
    style: c_int,
    kind: c_int,
    _nrow: c_int,
    _ncol: c_int,
) -> *mut c_void {
    let st: *mut StubState = raw.cast();
    if take_str(id) != "f1" {
        return ptr::null_mut();
    }
    match (style, kind) {
        // global fix values are engine-allocated and owed a free
        (0, 0) => alloc(st, &[7.5]).cast(),
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn stub_extract_variable(
    raw: RawHandle,
    name: *const c_char,
    _group: *const c_char,
) -> *mut c_void {
    let st: *mut StubState = raw.cast();
    match take_str(name).as_str() {
        "v1" => alloc(st, &[state(raw).variable_equal]).cast(),
        "va" => {
            let n = state(raw).nlocal.unsigned_abs() as usize;
            let values: Vec<f64> = (1..=n).map(|i| i as f64).collect();
            alloc(st, &values).cast()
        }
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn stub_set_variable(
    raw: RawHandle,
    name: *const c_char,
    value: *const c_char,
) -> c_int {
    let name = take_str(name);
    if name == "missing" {
        return -1;
    }
    state(raw).set_variables.push((name, take_str(value)));
    0
}

// ---------------------------------------------------------------------------
// gather / scatter / create

unsafe fn fill_sequential(kind: c_int, count: usize, data: *mut c_void) {
    if kind == 0 {
        let out = unsafe { std::slice::from_raw_parts_mut(data.cast::<c_int>(), count) };
        for (i, v) in out.iter_mut().enumerate() {
            *v = i as c_int;
        }
    } else {
        let out = unsafe { std::slice::from_raw_parts_mut(data.cast::<f64>(), count) };
        for (i, v) in out.iter_mut().enumerate() {
            *v = i as f64;
        }
    }
}

unsafe extern "C" fn stub_gather(
    raw: RawHandle,
    _name: *const c_char,
    kind: c_int,
    count: c_int,
    data: *mut c_void,
) {
    let st = state(raw);
    st.gather_calls += 1;
    let total = st.natoms as usize * count.unsigned_abs() as usize;
    unsafe { fill_sequential(kind, total, data) };
}

unsafe extern "C" fn stub_gather_subset(
    raw: RawHandle,
    _name: *const c_char,
    kind: c_int,
    count: c_int,
    ndata: c_int,
    _ids: *const c_int,
    data: *mut c_void,
) {
    let st = state(raw);
    st.gather_calls += 1;
    let total = ndata.unsigned_abs() as usize * count.unsigned_abs() as usize;
    unsafe { fill_sequential(kind, total, data) };
}

unsafe fn record_scatter(st: &mut StubState, kind: c_int, total: usize, data: *mut c_void) {
    st.scatter_calls += 1;
    st.scattered.clear();
    if kind == 0 {
        let src = unsafe { std::slice::from_raw_parts(data.cast::<c_int>(), total) };
        st.scattered.extend(src.iter().map(|&v| f64::from(v)));
    } else {
        let src = unsafe { std::slice::from_raw_parts(data.cast::<f64>(), total) };
        st.scattered.extend_from_slice(src);
    }
}

unsafe extern "C" fn stub_scatter(
    raw: RawHandle,
    _name: *const c_char,
    kind: c_int,
    count: c_int,
    data: *mut c_void,
) {
    let st = state(raw);
    let total = st.natoms as usize * count.unsigned_abs() as usize;
    unsafe { record_scatter(st, kind, total, data) };
}

unsafe extern "C" fn stub_scatter_subset(
    raw: RawHandle,
    _name: *const c_char,
    kind: c_int,
    count: c_int,
    ndata: c_int,
    _ids: *const c_int,
    data: *mut c_void,
) {
    let st = state(raw);
    let total = ndata.unsigned_abs() as usize * count.unsigned_abs() as usize;
    unsafe { record_scatter(st, kind, total, data) };
}

unsafe extern "C" fn stub_create_atoms(
    raw: RawHandle,
    n: c_int,
    _id: *const TagInt,
    _type: *const c_int,
    _x: *const f64,
    _v: *const f64,
    _image: *const ImageInt,
    _shrink: c_int,
) -> c_int {
    let st = state(raw);
    st.create_calls += 1;
    st.created = n;
    n
}

const IMAGE_BITS: ImageInt = 10;
const IMAGE_MAX: ImageInt = 512;

unsafe extern "C" fn stub_encode_image(ix: c_int, iy: c_int, iz: c_int) -> ImageInt {
    ((iz + IMAGE_MAX) << (2 * IMAGE_BITS)) | ((iy + IMAGE_MAX) << IMAGE_BITS) | (ix + IMAGE_MAX)
}

unsafe extern "C" fn stub_decode_image(image: ImageInt, flags: *mut c_int) {
    let mask = (1 << IMAGE_BITS) - 1;
    unsafe {
        *flags = (image & mask) - IMAGE_MAX;
        *flags.add(1) = ((image >> IMAGE_BITS) & mask) - IMAGE_MAX;
        *flags.add(2) = ((image >> (2 * IMAGE_BITS)) & mask) - IMAGE_MAX;
    }
}

// ---------------------------------------------------------------------------
// info / error state

unsafe extern "C" fn stub_version(_raw: RawHandle) -> c_int {
    20_230_802
}

unsafe extern "C" fn stub_os_info(buf: *mut c_char, cap: c_int) {
    put_str(buf, cap, "Linux (stub engine)");
}

unsafe extern "C" fn stub_get_mpi_comm(_raw: RawHandle) -> c_int {
    0
}

unsafe extern "C" fn stub_is_running(_raw: RawHandle) -> c_int {
    0
}

unsafe extern "C" fn stub_force_timeout(raw: RawHandle) {
    state(raw).timeout_requests += 1;
}

unsafe extern "C" fn stub_has_error(raw: RawHandle) -> c_int {
    c_int::from(state(raw).has_error)
}

unsafe extern "C" fn stub_last_error(raw: RawHandle, buf: *mut c_char, cap: c_int) -> c_int {
    let st = state(raw);
    put_str(buf, cap, &st.error_message.clone());
    st.has_error = false;
    st.error_kind
}

unsafe extern "C" fn flag_on() -> c_int {
    1
}

unsafe extern "C" fn flag_off() -> c_int {
    0
}

unsafe extern "C" fn stub_package_count() -> c_int {
    2
}

unsafe extern "C" fn stub_package_name(idx: c_int, buf: *mut c_char, cap: c_int) -> c_int {
    let names = ["KSPACE", "MOLECULE"];
    match names.get(idx.unsigned_abs() as usize) {
        Some(name) => {
            put_str(buf, cap, name);
            1
        }
        None => 0,
    }
}

unsafe extern "C" fn stub_accelerator(
    package: *const c_char,
    category: *const c_char,
    setting: *const c_char,
) -> c_int {
    let hit = take_str(package) == "GPU"
        && ((take_str(category) == "api" && take_str(setting) == "opencl")
            || (take_str(category) == "precision" && take_str(setting) == "mixed"));
    c_int::from(hit)
}

unsafe extern "C" fn stub_has_style(
    _raw: RawHandle,
    category: *const c_char,
    name: *const c_char,
) -> c_int {
    let known = take_str(category) == "pair"
        && matches!(take_str(name).as_str(), "lj/cut" | "eam");
    c_int::from(known)
}

unsafe extern "C" fn stub_style_count(_raw: RawHandle, category: *const c_char) -> c_int {
    if take_str(category) == "pair" {
        2
    } else {
        0
    }
}

unsafe extern "C" fn stub_style_name(
    _raw: RawHandle,
    _category: *const c_char,
    idx: c_int,
    buf: *mut c_char,
    cap: c_int,
) -> c_int {
    let names = ["lj/cut", "eam"];
    match names.get(idx.unsigned_abs() as usize) {
        Some(name) => {
            put_str(buf, cap, name);
            1
        }
        None => 0,
    }
}

unsafe extern "C" fn stub_has_id(
    _raw: RawHandle,
    category: *const c_char,
    name: *const c_char,
) -> c_int {
    let known = take_str(category) == "compute" && take_str(name) == "c1";
    c_int::from(known)
}

unsafe extern "C" fn stub_id_count(_raw: RawHandle, category: *const c_char) -> c_int {
    c_int::from(take_str(category) == "compute")
}

unsafe extern "C" fn stub_id_name(
    _raw: RawHandle,
    category: *const c_char,
    idx: c_int,
    buf: *mut c_char,
    cap: c_int,
) -> c_int {
    if take_str(category) == "compute" && idx == 0 {
        put_str(buf, cap, "c1");
        1
    } else {
        0
    }
}

unsafe extern "C" fn stub_plugin_count() -> c_int {
    1
}

unsafe extern "C" fn stub_plugin_name(
    idx: c_int,
    style: *mut c_char,
    name: *mut c_char,
    cap: c_int,
) -> c_int {
    if idx == 0 {
        put_str(style, cap, "pair");
        put_str(name, cap, "morse2");
        1
    } else {
        0
    }
}

unsafe extern "C" fn stub_set_external(
    raw: RawHandle,
    _fix_id: *const c_char,
    callback: ExternalRawFn,
    ctx: *mut c_void,
) {
    state(raw).external = Some((callback, ctx));
}

// ---------------------------------------------------------------------------
// neighbor lists

unsafe extern "C" fn stub_find_pair(
    _raw: RawHandle,
    style: *const c_char,
    _exact: c_int,
    _nsub: c_int,
    _request: c_int,
) -> c_int {
    if take_str(style) == "lj/cut" {
        0
    } else {
        -1
    }
}

unsafe extern "C" fn stub_find_fix(_raw: RawHandle, id: *const c_char, _request: c_int) -> c_int {
    if take_str(id) == "f1" {
        1
    } else {
        -1
    }
}

unsafe extern "C" fn stub_find_compute(
    _raw: RawHandle,
    id: *const c_char,
    _request: c_int,
) -> c_int {
    if take_str(id) == "c1" {
        0
    } else {
        -1
    }
}

unsafe extern "C" fn stub_neigh_num(_raw: RawHandle, idx: c_int) -> c_int {
    match idx {
        0 => 2,
        1 => 1,
        _ => 0,
    }
}

unsafe extern "C" fn stub_neigh_elem(
    raw: RawHandle,
    _idx: c_int,
    element: c_int,
    iatom: *mut c_int,
    numneigh: *mut c_int,
    neighbors: *mut *mut c_int,
) {
    let st = state(raw);
    let list = match element {
        0 => &mut st.neigh_first,
        1 => &mut st.neigh_second,
        _ => {
            unsafe { *iatom = -1 };
            return;
        }
    };
    unsafe {
        *iatom = element;
        *numneigh = list.len() as c_int;
        *neighbors = list.as_mut_ptr();
    }
}

/// One fake engine instance plus the symbol table that drives it.
pub struct StubEngine {
    state: *mut StubState,
}

impl StubEngine {
    pub fn new() -> Self {
        let state = Box::into_raw(Box::new(StubState::default()));
        // build the x row pointers after the state has its final address
        unsafe {
            let rows: Vec<*mut f64> = (0..4)
                .map(|i| (*state).positions.as_mut_ptr().add(3 * i))
                .collect();
            (*state).x_rows = rows;
        }
        CURRENT.with(|c| c.set(state));
        Self { state }
    }

    pub fn raw(&self) -> RawHandle {
        self.state.cast()
    }

    pub fn state(&self) -> &StubState {
        unsafe { &*self.state }
    }

    pub fn state_mut(&self) -> &mut StubState {
        unsafe { &mut *self.state }
    }

    pub fn set_error(&self, kind: i32, message: &str) {
        let st = self.state_mut();
        st.has_error = true;
        st.error_kind = kind;
        st.error_message = message.to_string();
    }

    /// Drive the registered external hook the way a running engine would.
    pub fn fire_external(&self, step: BigInt) {
        let st = self.state_mut();
        let Some((callback, ctx)) = st.external else {
            panic!("no external callback registered");
        };
        let n = st.nlocal.unsigned_abs() as usize;
        let mut forces = vec![0.0f64; 3 * n];
        let mut f_rows: Vec<*mut f64> =
            (0..n).map(|i| unsafe { forces.as_mut_ptr().add(3 * i) }).collect();
        unsafe {
            callback(
                ctx,
                step,
                st.nlocal,
                st.tags.as_mut_ptr(),
                st.x_rows.as_mut_ptr(),
                f_rows.as_mut_ptr(),
            );
        }
        st.scattered = forces;
    }

    pub fn api(&self) -> EngineApi {
        EngineApi {
            _lib: None,
            open_comm_int: stub_open_comm_int,
            open_comm_ptr: stub_open_comm_ptr,
            open_no_mpi: stub_open_no_mpi,
            close: stub_close,
            finalize: stub_finalize,
            free: stub_free,
            file: stub_file,
            command: stub_command,
            commands_list: stub_commands_list,
            commands_string: stub_commands_string,
            get_natoms: stub_get_natoms,
            extract_box: stub_extract_box,
            reset_box: stub_reset_box,
            get_thermo: stub_get_thermo,
            extract_setting: stub_extract_setting,
            extract_global_datatype: stub_global_datatype,
            extract_global: stub_extract_global,
            extract_atom_datatype: stub_atom_datatype,
            extract_atom: stub_extract_atom,
            extract_compute: stub_extract_compute,
            extract_fix: stub_extract_fix,
            extract_variable: stub_extract_variable,
            set_variable: stub_set_variable,
            gather_atoms: stub_gather,
            gather_atoms_concat: stub_gather,
            gather_atoms_subset: stub_gather_subset,
            scatter_atoms: stub_scatter,
            scatter_atoms_subset: stub_scatter_subset,
            gather: stub_gather,
            gather_concat: stub_gather,
            gather_subset: stub_gather_subset,
            scatter: stub_scatter,
            scatter_subset: stub_scatter_subset,
            create_atoms: stub_create_atoms,
            encode_image_flags: stub_encode_image,
            decode_image_flags: stub_decode_image,
            version: stub_version,
            get_os_info: stub_os_info,
            get_mpi_comm: stub_get_mpi_comm,
            is_running: stub_is_running,
            force_timeout: stub_force_timeout,
            has_error: stub_has_error,
            get_last_error_message: stub_last_error,
            config_has_mpi_support: flag_off,
            config_has_exceptions: flag_on,
            config_has_gzip_support: flag_on,
            config_has_png_support: flag_off,
            config_has_jpeg_support: flag_off,
            config_has_ffmpeg_support: flag_off,
            config_package_count: stub_package_count,
            config_package_name: stub_package_name,
            config_accelerator: stub_accelerator,
            has_style: stub_has_style,
            style_count: stub_style_count,
            style_name: stub_style_name,
            has_id: stub_has_id,
            id_count: stub_id_count,
            id_name: stub_id_name,
            plugin_count: stub_plugin_count,
            plugin_name: stub_plugin_name,
            set_fix_external_callback: stub_set_external,
            find_pair_neighlist: stub_find_pair,
            find_fix_neighlist: stub_find_fix,
            find_compute_neighlist: stub_find_compute,
            neighlist_num_elements: stub_neigh_num,
            neighlist_element_neighbors: stub_neigh_elem,
        }
    }
}

impl Drop for StubEngine {
    fn drop(&mut self) {
        // release anything the test never freed, then the state itself
        ALLOCS.lock().unwrap().retain(|r| r.owner != self.state as usize);
        CURRENT.with(|c| c.set(ptr::null_mut()));
        unsafe { drop(Box::from_raw(self.state)) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_image_codec_round_trip() {
        let engine = StubEngine::new();
        let api = engine.api();
        let packed = api.encode_image(-3, 0, 7);
        assert_eq!(api.decode_image(packed), [-3, 0, 7]);
    }

    #[test]
    fn test_take_f64_releases_allocation() {
        let engine = StubEngine::new();
        let api = engine.api();
        let p = api.fix_ptr(engine.raw(), c"f1", 0, 0, 0, 0);
        assert_eq!(api.take_f64(p), Some(7.5));
        assert_eq!(engine.state().free_calls, 1);
    }

    #[test]
    fn test_last_error_clears_flag() {
        let engine = StubEngine::new();
        let api = engine.api();
        engine.set_error(2, "boom");
        assert!(api.error_flag(engine.raw()));
        let (kind, message) = api.last_error(engine.raw());
        assert_eq!(kind, 2);
        assert_eq!(message, "boom");
        assert!(!api.error_flag(engine.raw()));
    }
}
