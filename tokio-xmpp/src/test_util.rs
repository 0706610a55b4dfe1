use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{Sink, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::{Error, Packet};

/// In-memory transport: whatever one end sends, the other receives, unserialised.
pub(crate) struct Loopback {
    tx: UnboundedSender<Packet>,
    rx: UnboundedReceiver<Packet>,
}

impl Loopback {
    pub(crate) fn pair() -> (Loopback, Loopback) {
        let (client_tx, server_rx) = unbounded();
        let (server_tx, client_rx) = unbounded();
        (
            Loopback {
                tx: client_tx,
                rx: client_rx,
            },
            Loopback {
                tx: server_tx,
                rx: server_rx,
            },
        )
    }
}

impl Stream for Loopback {
    type Item = Result<Packet, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|packet| packet.map(Ok))
    }
}

impl Sink<Packet> for Loopback {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        self.tx
            .unbounded_send(item)
            .map_err(|_| Error::Disconnected)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        self.tx.close_channel();
        Poll::Ready(Ok(()))
    }
}
