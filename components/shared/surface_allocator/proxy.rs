/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::thread;
use std::time::Duration;

use ipc_channel::ipc::{self, IpcReceiver, IpcSender};
use ipc_channel::{IpcError, TryRecvError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    DeathRecipient, ImageReaderDescriptor, RemoteSurfaceAllocator, SurfaceDescriptor,
    SurfaceHandle, SyncConfig, TransportError,
};

/// Messages understood by the surface allocator service.
#[derive(Debug, Deserialize, Serialize)]
pub enum SurfaceAllocatorMsg {
    AcquireSurfaceTexture {
        width: u32,
        height: u32,
        single_buffer_mode: bool,
        sender: IpcSender<Option<SurfaceDescriptor>>,
    },
    AcquireImageReader(ImageReaderDescriptor, IpcSender<Option<SurfaceDescriptor>>),
    ReleaseSurfaceTexture(SurfaceHandle),
    ReleaseImageReader(SurfaceHandle),
    ConfigureSync(SyncConfig, IpcSender<()>),
    Sync(SurfaceHandle),
    /// The service keeps the sender alive until it exits. The client notices the
    /// service going away when its end of the channel disconnects.
    LinkToDeath(IpcSender<()>),
    LiveSurfaceCount(IpcSender<usize>),
    Exit(IpcSender<()>),
}

/// The channel through which a surface allocator service is reached. This is what
/// the process manager hands to each process.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SurfaceAllocatorSender(pub IpcSender<SurfaceAllocatorMsg>);

impl SurfaceAllocatorSender {
    pub fn to_proxy(&self, timeout: Duration) -> SurfaceAllocatorProxy {
        SurfaceAllocatorProxy {
            sender: self.0.clone(),
            timeout,
        }
    }

    /// The number of surfaces the service currently holds on behalf of its clients.
    pub fn live_surface_count(&self) -> Option<usize> {
        let (sender, receiver) = ipc::channel().ok()?;
        self.0.send(SurfaceAllocatorMsg::LiveSurfaceCount(sender)).ok()?;
        receiver.recv().ok()
    }

    /// Shut the service down and wait until it acknowledges.
    pub fn exit(&self) {
        let Ok((sender, receiver)) = ipc::channel() else {
            warn!("Could not create a channel to stop the surface allocator service");
            return;
        };
        if self.0.send(SurfaceAllocatorMsg::Exit(sender)).is_err() {
            debug!("Surface allocator service has already exited");
            return;
        }
        let _ = receiver.recv();
    }
}

/// The [`RemoteSurfaceAllocator`] implementation that talks to a service over
/// `ipc-channel`. Every call that expects an answer creates its own reply channel and
/// waits for at most `timeout`.
#[derive(Debug)]
pub struct SurfaceAllocatorProxy {
    sender: IpcSender<SurfaceAllocatorMsg>,
    timeout: Duration,
}

impl SurfaceAllocatorProxy {
    fn send(&self, msg: SurfaceAllocatorMsg) -> Result<(), TransportError> {
        self.sender
            .send(msg)
            .map_err(|error| TransportError::Send(format!("{error:?}")))
    }

    fn request<T>(
        &self,
        msg: impl FnOnce(IpcSender<T>) -> SurfaceAllocatorMsg,
    ) -> Result<T, TransportError>
    where
        T: for<'de> Deserialize<'de> + Serialize,
    {
        let (reply_sender, reply_receiver) = ipc::channel()?;
        self.send(msg(reply_sender))?;
        match reply_receiver.try_recv_timeout(self.timeout) {
            Ok(reply) => Ok(reply),
            Err(TryRecvError::Empty) => Err(TransportError::Timeout(self.timeout)),
            Err(TryRecvError::IpcError(IpcError::Disconnected)) => {
                Err(TransportError::Disconnected)
            },
            Err(TryRecvError::IpcError(error)) => {
                Err(TransportError::Receive(format!("{error:?}")))
            },
        }
    }
}

impl RemoteSurfaceAllocator for SurfaceAllocatorProxy {
    fn acquire_surface_texture(
        &self,
        width: u32,
        height: u32,
        single_buffer_mode: bool,
    ) -> Result<Option<SurfaceDescriptor>, TransportError> {
        self.request(|sender| SurfaceAllocatorMsg::AcquireSurfaceTexture {
            width,
            height,
            single_buffer_mode,
            sender,
        })
    }

    fn acquire_image_reader(
        &self,
        descriptor: ImageReaderDescriptor,
    ) -> Result<Option<SurfaceDescriptor>, TransportError> {
        self.request(|sender| SurfaceAllocatorMsg::AcquireImageReader(descriptor, sender))
    }

    fn release_surface_texture(&self, handle: SurfaceHandle) -> Result<(), TransportError> {
        self.send(SurfaceAllocatorMsg::ReleaseSurfaceTexture(handle))
    }

    fn release_image_reader(&self, handle: SurfaceHandle) -> Result<(), TransportError> {
        self.send(SurfaceAllocatorMsg::ReleaseImageReader(handle))
    }

    fn configure_sync(&self, config: SyncConfig) -> Result<(), TransportError> {
        self.request(|sender| SurfaceAllocatorMsg::ConfigureSync(config, sender))
    }

    fn sync(&self, upstream: SurfaceHandle) -> Result<(), TransportError> {
        self.send(SurfaceAllocatorMsg::Sync(upstream))
    }

    fn link_to_death(&self, recipient: DeathRecipient) -> Result<(), TransportError> {
        let (death_sender, death_receiver) = ipc::channel()?;
        self.send(SurfaceAllocatorMsg::LinkToDeath(death_sender))?;
        thread::Builder::new()
            .name("SurfaceAllocatorDeathWatch".to_owned())
            .spawn(move || watch_for_death(death_receiver, recipient))
            .expect("Thread spawning failed");
        Ok(())
    }
}

/// How often a death watcher checks whether its connection was given up on.
const DEATH_WATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Nothing is ever sent on the death channel, so it only disconnects when the service
/// drops its sender, which happens when it exits or its process dies. Once the owner
/// of the connection unlinks, the watcher stops without notifying, so it never
/// outlives the connection by more than one poll interval.
fn watch_for_death(receiver: IpcReceiver<()>, recipient: DeathRecipient) {
    loop {
        match receiver.try_recv_timeout(DEATH_WATCH_POLL_INTERVAL) {
            Ok(()) => continue,
            Err(TryRecvError::Empty) if recipient.is_unlinked() => {
                debug!("Stopped watching a dropped surface allocator connection");
                return;
            },
            Err(TryRecvError::Empty) => continue,
            Err(TryRecvError::IpcError(error)) => {
                debug!("Surface allocator death channel closed ({error:?})");
                break;
            },
        }
    }
    recipient.notify();
}
