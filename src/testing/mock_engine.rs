//! Recording [`EngineHandle`] for driving the loop in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::engine::{EngineHandle, STATUS_OK, STATUS_REJECTED};

/// Processed blocks kept verbatim; later calls are only counted
pub const RECORDED_OUTPUT_LIMIT: usize = 64;

type StateCheck = Box<dyn Fn() -> bool + Send>;

/// Engine double.
///
/// Duplex calls add `offset` to every captured sample; render-only calls
/// fill the block with `render_fill`. Processing call number
/// `halt_on_call` (1-based, counting both kinds) returns `halt_status`;
/// call number `panic_on_call` panics instead of returning.
pub struct MockEngine {
    offset: i16,
    render_fill: i16,
    halt_on_call: Option<(usize, i32)>,
    panic_on_call: Option<usize>,
    known_parameters: i32,
    calls: AtomicUsize,
    duplex_calls: AtomicUsize,
    render_only_calls: AtomicUsize,
    calls_after_destroy: AtomicUsize,
    destroy_calls: AtomicUsize,
    parameters: Mutex<Vec<(i32, f32)>>,
    triggers: Mutex<Vec<i32>>,
    payloads: Mutex<Vec<(i32, Vec<u8>)>>,
    outputs: Mutex<Vec<Vec<i16>>>,
    state_check: Mutex<Option<StateCheck>>,
    check_results: Mutex<Vec<bool>>,
}

impl MockEngine {
    /// Passes captured samples through untouched and renders silence
    pub fn passthrough() -> Self {
        Self {
            offset: 0,
            render_fill: 0,
            halt_on_call: None,
            panic_on_call: None,
            known_parameters: 3,
            calls: AtomicUsize::new(0),
            duplex_calls: AtomicUsize::new(0),
            render_only_calls: AtomicUsize::new(0),
            calls_after_destroy: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            parameters: Mutex::new(Vec::new()),
            triggers: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            state_check: Mutex::new(None),
            check_results: Mutex::new(Vec::new()),
        }
    }

    pub fn with_offset(mut self, offset: i16) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_render_fill(mut self, value: i16) -> Self {
        self.render_fill = value;
        self
    }

    pub fn halt_on_call(mut self, call: usize, status: i32) -> Self {
        self.halt_on_call = Some((call, status));
        self
    }

    pub fn panic_on_call(mut self, call: usize) -> Self {
        self.panic_on_call = Some(call);
        self
    }

    /// Parameter indices `0..count` are accepted; the rest are rejected
    pub fn with_known_parameters(mut self, count: i32) -> Self {
        self.known_parameters = count;
        self
    }

    /// Evaluated on every processing call; results are kept in order
    pub fn set_state_check<F>(&self, check: F)
    where
        F: Fn() -> bool + Send + 'static,
    {
        *lock(&self.state_check) = Some(Box::new(check));
    }

    pub fn process_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn duplex_calls(&self) -> usize {
        self.duplex_calls.load(Ordering::SeqCst)
    }

    pub fn render_only_calls(&self) -> usize {
        self.render_only_calls.load(Ordering::SeqCst)
    }

    pub fn calls_after_destroy(&self) -> usize {
        self.calls_after_destroy.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn parameters(&self) -> Vec<(i32, f32)> {
        lock(&self.parameters).clone()
    }

    pub fn triggers(&self) -> Vec<i32> {
        lock(&self.triggers).clone()
    }

    pub fn payloads(&self) -> Vec<(i32, Vec<u8>)> {
        lock(&self.payloads).clone()
    }

    pub fn outputs(&self) -> Vec<Vec<i16>> {
        lock(&self.outputs).clone()
    }

    pub fn check_results(&self) -> Vec<bool> {
        lock(&self.check_results).clone()
    }

    fn begin_call(&self) -> i32 {
        if self.destroy_calls() > 0 {
            self.calls_after_destroy.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(check) = lock(&self.state_check).as_ref() {
            let seen = check();
            lock(&self.check_results).push(seen);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_call == Some(call) {
            panic!("mock engine panicked on processing call {}", call);
        }
        match self.halt_on_call {
            Some((halt_at, status)) if halt_at == call => status,
            _ => STATUS_OK,
        }
    }

    fn record_output(&self, block: &[i16]) {
        let mut outputs = lock(&self.outputs);
        if outputs.len() < RECORDED_OUTPUT_LIMIT {
            outputs.push(block.to_vec());
        }
    }
}

impl EngineHandle for MockEngine {
    fn process_duplex(&self, block: &mut [i16]) -> i32 {
        let status = self.begin_call();
        self.duplex_calls.fetch_add(1, Ordering::SeqCst);
        for sample in block.iter_mut() {
            *sample = sample.wrapping_add(self.offset);
        }
        self.record_output(block);
        status
    }

    fn process_render_only(&self, block: &mut [i16]) -> i32 {
        let status = self.begin_call();
        self.render_only_calls.fetch_add(1, Ordering::SeqCst);
        block.fill(self.render_fill);
        self.record_output(block);
        status
    }

    fn set_parameter(&self, index: i32, value: f32) -> i32 {
        if index < 0 || index >= self.known_parameters {
            return STATUS_REJECTED;
        }
        lock(&self.parameters).push((index, value));
        STATUS_OK
    }

    fn send_trigger(&self, index: i32) -> i32 {
        lock(&self.triggers).push(index);
        STATUS_OK
    }

    fn send_bytes(&self, index: i32, payload: &[u8]) -> i32 {
        lock(&self.payloads).push((index, payload.to_vec()));
        STATUS_OK
    }

    fn destroy_host(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
