//! Scripted transports for driving the socket state machine in tests

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    DatagramTransport, SignalSender, StreamTransport, TransportEvent, TransportFactory,
    TransportHandle,
};
use crate::config::TransportKind;

/// How a fake handle answers `connect`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ConnectScript {
    #[default]
    Accept,
    /// Fail with this errno
    Reject(i32),
    /// Never answer; the attempt stays in progress
    Hold,
}

/// Operations recorded by the fake handles
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Open(TransportKind),
    Connect(TransportKind, PathBuf),
    Write(Bytes),
    Send(Bytes),
    End,
    Close,
}

#[derive(Default)]
struct Script {
    stream_connect: ConnectScript,
    datagram_connect: ConnectScript,
    missing_endpoint: bool,
    congest_next_send: bool,
    hold_acks: bool,
    calls: Vec<Call>,
    handles: Vec<SignalSender>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeFactory {
    script: Arc<Mutex<Script>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_connect(self, script: ConnectScript) -> Self {
        self.script.lock().stream_connect = script;
        self
    }

    pub fn datagram_connect(self, script: ConnectScript) -> Self {
        self.script.lock().datagram_connect = script;
        self
    }

    pub fn missing_endpoint(self) -> Self {
        self.script.lock().missing_endpoint = true;
        self
    }

    /// Next datagram send reports congestion instead of sending
    pub fn congest_next_send(&self) {
        self.script.lock().congest_next_send = true;
    }

    /// Stop acknowledging writes; tests emit `Sent` themselves
    pub fn hold_acks(&self, hold: bool) {
        self.script.lock().hold_acks = hold;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub fn opened(&self) -> usize {
        self.script.lock().handles.len()
    }

    /// Payloads that actually reached a transport, in order
    pub fn delivered(&self) -> Vec<Bytes> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(payload) | Call::Send(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Emit on the most recently opened handle
    pub fn emit(&self, event: TransportEvent) {
        let signals = self.script.lock().handles.last().cloned();
        if let Some(signals) = signals {
            signals.emit(event);
        }
    }

    /// Emit on the `index`-th opened handle
    pub fn emit_on(&self, index: usize, event: TransportEvent) {
        let signals = self.script.lock().handles.get(index).cloned();
        if let Some(signals) = signals {
            signals.emit(event);
        }
    }

    fn record(&self, call: Call) {
        self.script.lock().calls.push(call);
    }

    fn answer_connect(&self, kind: TransportKind, path: &Path, signals: &SignalSender) {
        let script = {
            let mut script = self.script.lock();
            script.calls.push(Call::Connect(kind, path.to_path_buf()));
            match kind {
                TransportKind::Stream => script.stream_connect,
                TransportKind::Datagram => script.datagram_connect,
            }
        };
        match script {
            ConnectScript::Accept => signals.emit(TransportEvent::Connect),
            ConnectScript::Reject(errno) => {
                signals.emit(TransportEvent::Error(io::Error::from_raw_os_error(errno)));
            }
            ConnectScript::Hold => {}
        }
    }

    fn ack(&self, signals: &SignalSender) {
        if !self.script.lock().hold_acks {
            signals.emit(TransportEvent::Sent(Ok(())));
        }
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    fn open(&self, kind: TransportKind, signals: SignalSender) -> TransportHandle {
        {
            let mut script = self.script.lock();
            script.calls.push(Call::Open(kind));
            script.handles.push(signals.clone());
        }
        let fake = FakeTransport {
            factory: self.clone(),
            signals,
        };
        match kind {
            TransportKind::Stream => TransportHandle::Stream(Box::new(fake)),
            TransportKind::Datagram => TransportHandle::Datagram(Box::new(fake)),
        }
    }

    async fn probe(&self, _path: &Path) -> io::Result<()> {
        if self.script.lock().missing_endpoint {
            Err(io::Error::from(io::ErrorKind::NotFound))
        } else {
            Ok(())
        }
    }
}

struct FakeTransport {
    factory: FakeFactory,
    signals: SignalSender,
}

impl StreamTransport for FakeTransport {
    fn connect(&mut self, path: &Path) {
        self.factory
            .answer_connect(TransportKind::Stream, path, &self.signals);
    }

    fn write(&mut self, payload: Bytes) {
        self.factory.record(Call::Write(payload));
        self.factory.ack(&self.signals);
    }

    fn end(&mut self) {
        self.factory.record(Call::End);
        self.signals.emit(TransportEvent::Finished);
        self.signals.emit(TransportEvent::Close);
    }
}

impl DatagramTransport for FakeTransport {
    fn connect(&mut self, path: &Path) {
        self.factory
            .answer_connect(TransportKind::Datagram, path, &self.signals);
    }

    fn send(&mut self, payload: Bytes) {
        let congested = std::mem::take(&mut self.factory.script.lock().congest_next_send);
        if congested {
            self.signals.emit(TransportEvent::Congestion);
            return;
        }
        self.factory.record(Call::Send(payload));
        self.factory.ack(&self.signals);
    }

    fn close(&mut self) {
        self.factory.record(Call::Close);
    }
}
