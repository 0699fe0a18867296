// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! TCP transport.
//!
//! Frames are length-delimited; each body is one wire-encoded envelope.
//! A reader and a writer task bridge the socket to an in-process link.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ledgercut_kernel::config::MAX_FRAME_LEN;
use ledgercut_kernel::envelope::Envelope;
use ledgercut_kernel::wire;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::bank::Bank;
use crate::errors::NodeResult;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Binds `addr` and accepts peers until the returned task is aborted.
pub async fn listen(bank: Bank, addr: SocketAddr) -> NodeResult<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!("Listening for peers on {}", local);
    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    tracing::info!("Accepted peer connection from {}", remote);
                    spawn_link(&bank, stream, false);
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }
    });
    Ok((local, task))
}

/// Connects to a listening peer and starts the registration handshake.
pub async fn connect(bank: &Bank, addr: SocketAddr) -> NodeResult<JoinHandle<()>> {
    let stream = TcpStream::connect(addr).await?;
    tracing::info!("Connected to peer at {}", addr);
    Ok(spawn_link(bank, stream, true))
}

fn spawn_link(bank: &Bank, stream: TcpStream, initiate: bool) -> JoinHandle<()> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("TCP_NODELAY not set: {}", e);
    }
    let (mut sink, mut source) = Framed::new(stream, codec()).split::<Bytes>();
    let (link, mut outgoing) = mpsc::unbounded_channel::<Envelope>();
    let (deliver, inbound) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
        while let Some(envelope) = outgoing.recv().await {
            let body = match wire::encode(&envelope) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("Dropping unencodable {:?}: {}", envelope.command, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Bytes::from(body)).await {
                tracing::warn!("Peer write failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Peer read failed: {}", e);
                    break;
                }
            };
            match wire::decode(&frame) {
                Ok(envelope) => {
                    if deliver.send(envelope).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
            }
        }
    });

    bank.attach(link, inbound, initiate)
}
