// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process links, for running several banks in one runtime.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Inbound, Link};
use crate::bank::Bank;

pub struct Endpoint {
    pub link: Link,
    pub inbound: Inbound,
}

/// Two endpoints wired back to back.
pub fn duplex() -> (Endpoint, Endpoint) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Endpoint { link: a_tx, inbound: b_rx },
        Endpoint { link: b_tx, inbound: a_rx },
    )
}

/// Links two banks; `from` performs the registration handshake.
pub fn connect(from: &Bank, to: &Bank) -> (JoinHandle<()>, JoinHandle<()>) {
    let (near, far) = duplex();
    let to_task = to.attach(far.link, far.inbound, false);
    let from_task = from.attach(near.link, near.inbound, true);
    (from_task, to_task)
}
