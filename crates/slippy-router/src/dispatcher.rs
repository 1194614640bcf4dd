//! Client request handling.
//!
//! One dispatcher is shared by every connection. It turns a framed request
//! line into a serial write, a reset, or a reply for the requesting client.

use std::sync::Arc;

use slippy_metrics::metric_defs;
use slippy_protocol::{Event, Request};
use tokio::task;
use tracing::{debug, info};

use crate::device_state::DeviceState;
use crate::error::{DispatchError, SerialError};
use crate::serial_link::SerialLink;

/// Executes client requests against the serial link.
pub struct CommandDispatcher {
    link: Arc<SerialLink>,
    device: Arc<DeviceState>,
}

impl CommandDispatcher {
    /// Create a dispatcher for `link`, answering queries from `device`.
    pub fn new(link: Arc<SerialLink>, device: Arc<DeviceState>) -> Self {
        CommandDispatcher { link, device }
    }

    /// Handle one request line.
    ///
    /// Returns the reply for the requesting client, if the request has one.
    pub async fn dispatch(&self, line: &str) -> Result<Option<Event>, DispatchError> {
        let request = Request::parse(line)?;
        let function = request.function();
        metrics::counter!(metric_defs::REQUESTS.name, "function" => function.as_str()).increment(1);
        debug!(function = %function, "dispatching request");

        match request {
            Request::SerialSend { data } => {
                self.write(data.into_bytes()).await?;
                Ok(None)
            }
            Request::SlippySend(packet) => {
                self.write(packet.to_command().into_bytes()).await?;
                Ok(None)
            }
            Request::SerialReset => {
                self.reset().await?;
                Ok(None)
            }
            Request::GetInfo => Ok(Some(Event::DeviceInfo {
                address: self.device.address(),
            })),
        }
    }

    async fn write(&self, data: Vec<u8>) -> Result<(), SerialError> {
        let link = Arc::clone(&self.link);
        let len = data.len();
        task::spawn_blocking(move || link.write(&data))
            .await
            .map_err(|e| SerialError::Io(e.into()))??;
        metrics::counter!(metric_defs::SERIAL_BYTES_WRITTEN.name).increment(len as u64);
        Ok(())
    }

    async fn reset(&self) -> Result<(), SerialError> {
        let link = Arc::clone(&self.link);
        let result = task::spawn_blocking(move || link.reset())
            .await
            .map_err(|e| SerialError::Io(e.into()))
            .and_then(|r| r);

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(metric_defs::SERIAL_RESETS.name, "outcome" => outcome).increment(1);
        if result.is_ok() {
            info!(device = %self.link.describe(), "serial link reset by client");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use parking_lot::Mutex;
    use slippy_protocol::ProtocolError;

    use crate::serial_link::{SerialDevice, SerialHandles};

    struct Silent;

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
        }
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct CaptureDevice(Capture);

    impl SerialDevice for CaptureDevice {
        fn open(&self) -> io::Result<SerialHandles> {
            Ok(SerialHandles {
                reader: Box::new(Silent),
                writer: Box::new(self.0.clone()),
            })
        }

        fn describe(&self) -> String {
            "capture".to_string()
        }
    }

    fn dispatcher() -> (CommandDispatcher, Capture, Arc<DeviceState>) {
        let capture = Capture::default();
        let link = SerialLink::new(Box::new(CaptureDevice(capture.clone())), Duration::ZERO);
        link.open().unwrap();
        let device = Arc::new(DeviceState::new());
        (
            CommandDispatcher::new(Arc::new(link), Arc::clone(&device)),
            capture,
            device,
        )
    }

    fn written(capture: &Capture) -> String {
        String::from_utf8(capture.0.lock().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_serial_send_writes_verbatim() {
        let (dispatcher, capture, _) = dispatcher();
        let reply = dispatcher
            .dispatch(r#"{"function":"serial::send","args":{"data":"ver\r"}}"#)
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(written(&capture), "ver\r");
    }

    #[tokio::test]
    async fn test_slippy_send_writes_command() {
        let (dispatcher, capture, _) = dispatcher();
        dispatcher
            .dispatch(r#"{"function":"slippy::send","args":{"to":"0x01234567","data":"aGk=","type":"1","service":2,"flags":[true,false,true]}}"#)
            .await
            .unwrap();
        assert_eq!(written(&capture), "send64 0x01234567 \"aGk=\" 1 2 0b101\n");
    }

    #[tokio::test]
    async fn test_get_info_replies_with_address() {
        let (dispatcher, capture, device) = dispatcher();
        let request = r#"{"function":"slippy::get_info","args":{}}"#;

        let reply = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(
            reply,
            Some(Event::DeviceInfo {
                address: "0x00000000".into()
            })
        );

        device.set_address("0x89abcdef");
        let reply = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(
            reply,
            Some(Event::DeviceInfo {
                address: "0x89abcdef".into()
            })
        );
        assert!(written(&capture).is_empty());
    }

    #[tokio::test]
    async fn test_rejections_write_nothing() {
        let (dispatcher, capture, _) = dispatcher();

        let err = dispatcher
            .dispatch(r#"{"function":"serial::explode","args":{}}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::UnknownFunction(_))
        ));

        let err = dispatcher
            .dispatch(r#"{"function":"slippy::send","args":{"to":"0x1","data":"x","type":300,"service":1,"flags":[]}}"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_request");

        let err = dispatcher.dispatch("{not json").await.unwrap_err();
        assert!(matches!(err, DispatchError::Protocol(_)));

        assert!(written(&capture).is_empty());
    }

    #[tokio::test]
    async fn test_reset_reopens_link() {
        let (dispatcher, capture, _) = dispatcher();
        let before = dispatcher.link.generation();
        dispatcher
            .dispatch(r#"{"function":"serial::reset"}"#)
            .await
            .unwrap();
        assert_eq!(dispatcher.link.generation(), before + 1);

        dispatcher
            .dispatch(r#"{"function":"serial::send","args":{"data":"after"}}"#)
            .await
            .unwrap();
        assert_eq!(written(&capture), "after");
    }

    #[tokio::test]
    async fn test_closed_link_is_serial_error() {
        let link = SerialLink::new(Box::new(CaptureDevice(Capture::default())), Duration::ZERO);
        let dispatcher = CommandDispatcher::new(Arc::new(link), Arc::new(DeviceState::new()));
        let err = dispatcher
            .dispatch(r#"{"function":"serial::send","args":{"data":"x"}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Serial(SerialError::Closed)));
        assert_eq!(err.kind(), "serial");
    }
}
