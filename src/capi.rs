//! # C ABI surface
//!
//! A thin `extern "C"` veneer following the naming in the original
//! `multio_capi.cc` (`configuration_*`, `handle_*`, `metadata_*`, `data_*`,
//! plus a failure handler registry), so the host application that embeds
//! this core over FFI sees the same shape it always has. This is the only
//! module in the crate that contains `unsafe` — everywhere else works with
//! the safe core types directly.
//!
//! Every entry point translates raw pointers into the safe core types,
//! drives a single client-side `TcpTransport` on a process-wide Tokio
//! runtime, and converts a `MultioError` into one of the four error codes
//! below, invoking the registered failure handler exactly once per failed
//! call (§6, §7).

use crate::error::MultioError;
use crate::message::{Message, Payload, Peer, Tag};
use crate::metadata::Metadata;
use crate::transport::tcp::TcpTransport;
use crate::transport::{Transport, TransportConfig};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_float, c_int, c_void};
use std::sync::OnceLock;

pub const MULTIO_SUCCESS: c_int = 0;
pub const MULTIO_ERROR_ECKIT_EXCEPTION: c_int = 1;
pub const MULTIO_ERROR_GENERAL_EXCEPTION: c_int = 2;
pub const MULTIO_ERROR_UNKNOWN_EXCEPTION: c_int = 3;

/// `(user_context, error_code)`; the host reads the nested-cause string via
/// `multio_error_string`, mirroring the original's two-call handshake rather
/// than passing the string pointer directly through the callback.
pub type FailureHandler = extern "C" fn(*mut c_void, c_int);

thread_local! {
    static LAST_ERROR: RefCell<String> = RefCell::new(String::new());
    static LAST_ERROR_CSTRING: RefCell<CString> = RefCell::new(CString::new("").unwrap());
}

fn runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to start the multio C ABI runtime")
    })
}

fn error_code(err: &MultioError) -> c_int {
    match err {
        MultioError::Io(_) | MultioError::TransportFailure(_) | MultioError::CorruptJournal(_) => {
            MULTIO_ERROR_ECKIT_EXCEPTION
        }
        MultioError::Configuration(_) | MultioError::FieldError(_) | MultioError::MetadataMissing(_) | MultioError::InvalidField(_) => {
            MULTIO_ERROR_GENERAL_EXCEPTION
        }
        MultioError::SinkFailure(_) => MULTIO_ERROR_UNKNOWN_EXCEPTION,
    }
}

/// Record `err`'s message, invoke `failure` if registered, and return its
/// error code. Called exactly once per failed API call (§7 Propagation).
fn report_failure(err: MultioError, failure: &FailureContext) -> c_int {
    let code = error_code(&err);
    let message = err.to_string();
    LAST_ERROR.with(|cell| *cell.borrow_mut() = message);
    if let Some(handler) = failure.handler {
        handler(failure.user_context, code);
    }
    code
}

fn finish(result: Result<(), MultioError>, failure: &FailureContext) -> c_int {
    match result {
        Ok(()) => MULTIO_SUCCESS,
        Err(err) => report_failure(err, failure),
    }
}

struct FailureContext {
    handler: Option<FailureHandler>,
    user_context: *mut c_void,
}

impl Default for FailureContext {
    fn default() -> Self {
        FailureContext {
            handler: None,
            user_context: std::ptr::null_mut(),
        }
    }
}

pub struct multio_configuration_t {
    transport: TransportConfig,
    failure: FailureContext,
}

pub struct multio_handle_t {
    transport: TcpTransport,
    local_peer: Peer,
    server_peer: Peer,
    failure: FailureContext,
}

pub struct multio_metadata_t {
    metadata: Metadata,
}

pub struct multio_data_t {
    buffer: Vec<u8>,
}

fn set_out<T>(out: *mut *mut T, value: T) {
    unsafe {
        *out = Box::into_raw(Box::new(value));
    }
}

/// # Safety
/// `out` must be a valid pointer to write a `*mut multio_configuration_t` into.
#[no_mangle]
pub unsafe extern "C" fn multio_configuration_new(out: *mut *mut multio_configuration_t) -> c_int {
    set_out(
        out,
        multio_configuration_t {
            transport: TransportConfig::default(),
            failure: FailureContext::default(),
        },
    );
    MULTIO_SUCCESS
}

/// # Safety
/// `cc` must be a pointer previously returned by `multio_configuration_new`.
#[no_mangle]
pub unsafe extern "C" fn multio_configuration_delete(cc: *mut multio_configuration_t) -> c_int {
    if !cc.is_null() {
        drop(Box::from_raw(cc));
    }
    MULTIO_SUCCESS
}

/// # Safety
/// `cc` must be valid; `host` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn multio_configuration_set_host(
    cc: *mut multio_configuration_t,
    host: *const c_char,
    port: c_int,
) -> c_int {
    let cc = &mut *cc;
    let result = (|| {
        let host = CStr::from_ptr(host)
            .to_str()
            .map_err(|e| MultioError::Configuration(format!("invalid host string: {e}")))?;
        cc.transport.host = host.to_string();
        cc.transport.port = port as u16;
        Ok(())
    })();
    finish(result, &cc.failure)
}

/// # Safety
/// `cc` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_configuration_set_failure_handler(
    cc: *mut multio_configuration_t,
    handler: FailureHandler,
    user_context: *mut c_void,
) -> c_int {
    let cc = &mut *cc;
    cc.failure.handler = Some(handler);
    cc.failure.user_context = user_context;
    MULTIO_SUCCESS
}

/// # Safety
/// `cc` must be valid; `out` must be a valid pointer to write into.
#[no_mangle]
pub unsafe extern "C" fn multio_handle_new(
    cc: *const multio_configuration_t,
    out: *mut *mut multio_handle_t,
) -> c_int {
    let cc = &*cc;
    let result = runtime().block_on(TcpTransport::connect_client(&cc.transport));
    match result {
        Ok(transport) => {
            set_out(
                out,
                multio_handle_t {
                    transport,
                    local_peer: cc.transport.local_peer.clone(),
                    server_peer: Peer::new("server", 0),
                    failure: FailureContext::default(),
                },
            );
            MULTIO_SUCCESS
        }
        Err(err) => report_failure(err, &cc.failure),
    }
}

/// # Safety
/// `mio` must be a pointer previously returned by `multio_handle_new`.
#[no_mangle]
pub unsafe extern "C" fn multio_handle_delete(mio: *mut multio_handle_t) -> c_int {
    if !mio.is_null() {
        drop(Box::from_raw(mio));
    }
    MULTIO_SUCCESS
}

/// # Safety
/// `mio` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_handle_set_failure_handler(
    mio: *mut multio_handle_t,
    handler: FailureHandler,
    user_context: *mut c_void,
) -> c_int {
    let mio = &mut *mio;
    mio.failure.handler = Some(handler);
    mio.failure.user_context = user_context;
    MULTIO_SUCCESS
}

fn send_blocking(mio: &mut multio_handle_t, msg: Message) -> Result<(), MultioError> {
    runtime()
        .block_on(mio.transport.send(msg))
        .map_err(|send_err| send_err.error)
}

/// # Safety
/// `mio` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_open_connections(mio: *mut multio_handle_t) -> c_int {
    let mio = &mut *mio;
    let msg = Message::new(Tag::Open, mio.local_peer.clone(), mio.server_peer.clone(), Metadata::new(), Payload::empty());
    let result = send_blocking(mio, msg);
    finish(result, &mio.failure)
}

/// # Safety
/// `mio` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_close_connections(mio: *mut multio_handle_t) -> c_int {
    let mio = &mut *mio;
    let msg = Message::new(Tag::Close, mio.local_peer.clone(), mio.server_peer.clone(), Metadata::new(), Payload::empty());
    let result = send_blocking(mio, msg);
    finish(result, &mio.failure)
}

/// # Safety
/// `mio` and `md` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_flush(mio: *mut multio_handle_t, md: *const multio_metadata_t) -> c_int {
    let mio = &mut *mio;
    let md = &*md;
    let msg = Message::new(Tag::Flush, mio.local_peer.clone(), mio.server_peer.clone(), md.metadata.clone(), Payload::empty());
    let result = send_blocking(mio, msg);
    finish(result, &mio.failure)
}

/// # Safety
/// `mio` and `md` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_notify(mio: *mut multio_handle_t, md: *const multio_metadata_t) -> c_int {
    let mio = &mut *mio;
    let md = &*md;
    let msg = Message::new(Tag::Notification, mio.local_peer.clone(), mio.server_peer.clone(), md.metadata.clone(), Payload::empty());
    let result = send_blocking(mio, msg);
    finish(result, &mio.failure)
}

fn write_field(mio: &mut multio_handle_t, metadata: Metadata, payload: Vec<u8>) -> Result<(), MultioError> {
    let msg = Message::new(Tag::Field, mio.local_peer.clone(), mio.server_peer.clone(), metadata, Payload::new(payload));
    send_blocking(mio, msg)
}

/// # Safety
/// `mio`, `md` must be valid; `data` must point to at least `size` `f32`s.
#[no_mangle]
pub unsafe extern "C" fn multio_write_field_float(
    mio: *mut multio_handle_t,
    md: *const multio_metadata_t,
    data: *const c_float,
    size: c_int,
) -> c_int {
    let mio = &mut *mio;
    let md = &*md;
    let slice = std::slice::from_raw_parts(data, size as usize);
    let mut metadata = md.metadata.clone();
    metadata.set("precision", "single");
    let mut payload = Vec::with_capacity(slice.len() * 4);
    for &v in slice {
        payload.extend_from_slice(&v.to_ne_bytes());
    }
    let result = write_field(mio, metadata, payload);
    finish(result, &mio.failure)
}

/// # Safety
/// `mio`, `md` must be valid; `data` must point to at least `size` `f64`s.
#[no_mangle]
pub unsafe extern "C" fn multio_write_field_double(
    mio: *mut multio_handle_t,
    md: *const multio_metadata_t,
    data: *const c_double,
    size: c_int,
) -> c_int {
    let mio = &mut *mio;
    let md = &*md;
    let slice = std::slice::from_raw_parts(data, size as usize);
    let mut metadata = md.metadata.clone();
    metadata.set("precision", "double");
    let mut payload = Vec::with_capacity(slice.len() * 8);
    for &v in slice {
        payload.extend_from_slice(&v.to_ne_bytes());
    }
    let result = write_field(mio, metadata, payload);
    finish(result, &mio.failure)
}

/// # Safety
/// `mio`, `md`, `d` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_write_field_buffer(
    mio: *mut multio_handle_t,
    md: *const multio_metadata_t,
    d: *const multio_data_t,
) -> c_int {
    let mio = &mut *mio;
    let md = &*md;
    let d = &*d;
    let result = write_field(mio, md.metadata.clone(), d.buffer.clone());
    finish(result, &mio.failure)
}

/// # Safety
/// `mio`, `md`, `accepted` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_field_accepted(
    _mio: *const multio_handle_t,
    _md: *const multio_metadata_t,
    accepted: *mut bool,
) -> c_int {
    // The core has no client-side pipeline to consult (`Select` runs
    // server-side); every field is accepted for send.
    *accepted = true;
    MULTIO_SUCCESS
}

/// # Safety
/// `out` must be a valid pointer to write into.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_new(out: *mut *mut multio_metadata_t) -> c_int {
    set_out(out, multio_metadata_t { metadata: Metadata::new() });
    MULTIO_SUCCESS
}

/// # Safety
/// `md` must be a pointer previously returned by `multio_metadata_new` or `multio_metadata_copy`.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_delete(md: *mut multio_metadata_t) -> c_int {
    if !md.is_null() {
        drop(Box::from_raw(md));
    }
    MULTIO_SUCCESS
}

/// # Safety
/// `from` and `out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_copy(from: *const multio_metadata_t, out: *mut *mut multio_metadata_t) -> c_int {
    let from = &*from;
    set_out(out, multio_metadata_t { metadata: from.metadata.clone() });
    MULTIO_SUCCESS
}

unsafe fn with_key<'a>(key: *const c_char) -> Result<&'a str, MultioError> {
    CStr::from_ptr(key)
        .to_str()
        .map_err(|e| MultioError::Configuration(format!("invalid metadata key: {e}")))
}

/// # Safety
/// `md` must be valid; `key` a NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_set_int(md: *mut multio_metadata_t, key: *const c_char, value: c_int) -> c_int {
    let md = &mut *md;
    match with_key(key) {
        Ok(key) => {
            md.metadata.set(key, value as i64);
            MULTIO_SUCCESS
        }
        Err(_) => MULTIO_ERROR_GENERAL_EXCEPTION,
    }
}

/// # Safety
/// `md` must be valid; `key` a NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_set_long(md: *mut multio_metadata_t, key: *const c_char, value: i64) -> c_int {
    let md = &mut *md;
    match with_key(key) {
        Ok(key) => {
            md.metadata.set(key, value);
            MULTIO_SUCCESS
        }
        Err(_) => MULTIO_ERROR_GENERAL_EXCEPTION,
    }
}

/// # Safety
/// `md` must be valid; `key` and `value` NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_set_string(md: *mut multio_metadata_t, key: *const c_char, value: *const c_char) -> c_int {
    let md = &mut *md;
    let result = (|| {
        let key = with_key(key)?;
        let value = CStr::from_ptr(value)
            .to_str()
            .map_err(|e| MultioError::Configuration(format!("invalid metadata value: {e}")))?;
        md.metadata.set(key, value);
        Ok::<(), MultioError>(())
    })();
    if result.is_ok() { MULTIO_SUCCESS } else { MULTIO_ERROR_GENERAL_EXCEPTION }
}

/// # Safety
/// `md` must be valid; `key` a NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_set_bool(md: *mut multio_metadata_t, key: *const c_char, value: bool) -> c_int {
    let md = &mut *md;
    match with_key(key) {
        Ok(key) => {
            md.metadata.set(key, value);
            MULTIO_SUCCESS
        }
        Err(_) => MULTIO_ERROR_GENERAL_EXCEPTION,
    }
}

/// # Safety
/// `md` must be valid; `key` a NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn multio_metadata_set_double(md: *mut multio_metadata_t, key: *const c_char, value: c_double) -> c_int {
    let md = &mut *md;
    match with_key(key) {
        Ok(key) => {
            md.metadata.set(key, value);
            MULTIO_SUCCESS
        }
        Err(_) => MULTIO_ERROR_GENERAL_EXCEPTION,
    }
}

/// # Safety
/// `out` must be a valid pointer to write into.
#[no_mangle]
pub unsafe extern "C" fn multio_data_new(out: *mut *mut multio_data_t) -> c_int {
    set_out(out, multio_data_t { buffer: Vec::new() });
    MULTIO_SUCCESS
}

/// # Safety
/// `d` must be a pointer previously returned by `multio_data_new`.
#[no_mangle]
pub unsafe extern "C" fn multio_data_delete(d: *mut multio_data_t) -> c_int {
    if !d.is_null() {
        drop(Box::from_raw(d));
    }
    MULTIO_SUCCESS
}

/// # Safety
/// `d` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_data_resize(d: *mut multio_data_t, new_size: c_int) -> c_int {
    let d = &mut *d;
    if new_size < 0 {
        return MULTIO_ERROR_GENERAL_EXCEPTION;
    }
    d.buffer.resize(new_size as usize, 0);
    MULTIO_SUCCESS
}

/// # Safety
/// `d` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_data_zero(d: *mut multio_data_t) -> c_int {
    let d = &mut *d;
    d.buffer.iter_mut().for_each(|b| *b = 0);
    MULTIO_SUCCESS
}

/// # Safety
/// `d` and `size` must be valid.
#[no_mangle]
pub unsafe extern "C" fn multio_data_size(d: *const multio_data_t, size: *mut c_int) -> c_int {
    let d = &*d;
    *size = d.buffer.len() as c_int;
    MULTIO_SUCCESS
}

/// Pure bounds check for `multio_data_set_*_chunk`: the stricter form from
/// the Open Questions, `(pos + size) * sizeof(T) <= buffer_size`, unlike the
/// original `pos * sizeof(T) < size` which ignores the `size` elements
/// written past `pos`.
fn chunk_fits(pos: i64, size: i64, elem_size: usize, buffer_size: usize) -> bool {
    if pos < 0 || size < 0 {
        return false;
    }
    match (pos as u128 + size as u128).checked_mul(elem_size as u128) {
        Some(total) => total <= buffer_size as u128,
        None => false,
    }
}

/// # Safety
/// `d` must be valid; `value` must point to at least `size` `f32`s.
#[no_mangle]
pub unsafe extern "C" fn multio_data_set_float_chunk(d: *mut multio_data_t, value: *const c_float, pos: c_int, size: c_int) -> c_int {
    let d = &mut *d;
    if !chunk_fits(pos as i64, size as i64, std::mem::size_of::<f32>(), d.buffer.len()) {
        return MULTIO_ERROR_GENERAL_EXCEPTION;
    }
    let values = std::slice::from_raw_parts(value, size as usize);
    let floats: &mut [f32] = std::slice::from_raw_parts_mut(d.buffer.as_mut_ptr() as *mut f32, d.buffer.len() / 4);
    floats[pos as usize..pos as usize + size as usize].copy_from_slice(values);
    MULTIO_SUCCESS
}

/// # Safety
/// `d` must be valid; `value` must point to at least `size` `f64`s.
#[no_mangle]
pub unsafe extern "C" fn multio_data_set_double_chunk(d: *mut multio_data_t, value: *const c_double, pos: c_int, size: c_int) -> c_int {
    let d = &mut *d;
    if !chunk_fits(pos as i64, size as i64, std::mem::size_of::<f64>(), d.buffer.len()) {
        return MULTIO_ERROR_GENERAL_EXCEPTION;
    }
    let values = std::slice::from_raw_parts(value, size as usize);
    let doubles: &mut [f64] = std::slice::from_raw_parts_mut(d.buffer.as_mut_ptr() as *mut f64, d.buffer.len() / 8);
    doubles[pos as usize..pos as usize + size as usize].copy_from_slice(values);
    MULTIO_SUCCESS
}

/// # Safety
/// None — reads process-wide thread-local state only.
#[no_mangle]
pub unsafe extern "C" fn multio_error_string(_err: c_int) -> *const c_char {
    let message = LAST_ERROR.with(|cell| cell.borrow().clone());
    LAST_ERROR_CSTRING.with(|cell| {
        *cell.borrow_mut() = CString::new(message).unwrap_or_else(|_| CString::new("<error message contained NUL>").unwrap());
        cell.borrow().as_ptr()
    })
}
