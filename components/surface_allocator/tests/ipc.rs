/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The allocator talking to a real service thread over `ipc-channel`.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use surface_allocator::{
    AllocatorError, AllocatorServiceConfig, IpcAllocatorLocator, SurfaceAllocator,
    SurfaceAllocatorPrefs, SurfaceAllocatorService,
};
use ipc_channel::ipc;
use surface_allocator_traits::{
    ConsumerKind, ProcessRole, SurfaceAllocatorMsg, SurfaceAllocatorSender,
};

use crate::mock::MockPlatform;

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

struct IpcFixture {
    allocator: SurfaceAllocator,
    locator: Arc<IpcAllocatorLocator>,
    platform: Arc<MockPlatform>,
}

fn ipc_fixture(role: ProcessRole, service: Option<SurfaceAllocatorSender>) -> IpcFixture {
    let prefs = SurfaceAllocatorPrefs {
        rpc_timeout_ms: 2000,
        ..Default::default()
    };
    let locator = Arc::new(IpcAllocatorLocator::new(role, &prefs));
    match role {
        ProcessRole::Parent => locator.set_parent_sender(service),
        ProcessRole::Child => locator.set_child_sender(service),
    }
    let platform = Arc::new(MockPlatform::new(33, true));
    let allocator = SurfaceAllocator::new(locator.clone(), platform.clone(), prefs);
    IpcFixture {
        allocator,
        locator,
        platform,
    }
}

#[test]
fn acquire_and_release_over_ipc() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));

    let surface = fixture
        .allocator
        .acquire_surface_texture(256, 256, false)
        .expect("service should hand out a surface");
    assert!(fixture.allocator.is_connected());
    assert!(surface.sync_config().is_some());
    assert_eq!(service.live_surface_count(), Some(1));

    fixture.allocator.sync(surface.handle());
    fixture.allocator.dispose_surface(&surface);
    assert!(wait_until(|| service.live_surface_count() == Some(0)));
    assert!(fixture.platform.live_sync_surfaces().is_empty());

    service.exit();
}

#[test]
fn in_process_service_needs_no_sync() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig {
        in_process: true,
        ..Default::default()
    });
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));

    let surface = fixture
        .allocator
        .acquire_surface_texture(64, 64, true)
        .unwrap();
    assert!(surface.is_in_process());
    assert!(surface.sync_config().is_none());
    assert!(fixture.platform.live_sync_surfaces().is_empty());

    service.exit();
}

#[test]
fn service_exit_invalidates_surfaces_and_restart_reconnects() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));
    let lost = fixture
        .allocator
        .acquire_surface_texture(64, 64, false)
        .unwrap();

    service.exit();
    assert!(wait_until(|| !lost.is_valid()));
    assert!(wait_until(|| !fixture.allocator.is_connected()));
    assert_eq!(fixture.allocator.live_surface_count(), 0);
    assert!(fixture.platform.live_sync_surfaces().is_empty());

    let restarted = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    fixture.locator.set_parent_sender(Some(restarted.clone()));
    let replacement = fixture
        .allocator
        .acquire_surface_texture(64, 64, false)
        .expect("should reconnect to the restarted service");
    assert!(replacement.is_valid());
    assert_ne!(replacement.handle(), lost.handle());
    assert_eq!(restarted.live_surface_count(), Some(1));

    restarted.exit();
}

#[test]
fn service_denies_beyond_capacity() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig {
        max_surfaces: 2,
        ..Default::default()
    });
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));

    let _first = fixture.allocator.acquire_surface_texture(8, 8, false).unwrap();
    let _second = fixture.allocator.acquire_surface_texture(8, 8, false).unwrap();
    assert!(matches!(
        fixture.allocator.try_acquire_surface_texture(8, 8, false),
        Err(AllocatorError::RemoteDenied)
    ));
    assert!(matches!(
        fixture.allocator.try_acquire_surface_texture(0, 8, false),
        Err(AllocatorError::RemoteDenied)
    ));
    assert_eq!(fixture.allocator.live_surface_count(), 2);

    service.exit();
}

#[test]
fn missing_service_reports_unavailable() {
    let fixture = ipc_fixture(ProcessRole::Parent, None);
    assert!(fixture.allocator.acquire_surface_texture(8, 8, false).is_none());
    assert!(matches!(
        fixture.allocator.try_acquire_surface_texture(8, 8, false),
        Err(AllocatorError::ConnectionUnavailable)
    ));
    assert!(!fixture.allocator.is_connected());
}

#[test]
fn image_reader_over_ipc() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));

    let reader = fixture
        .allocator
        .acquire_image_reader(320, 240, 1, 3, 0)
        .unwrap();
    assert_eq!(reader.consumer_kind(), ConsumerKind::ImageReader);
    assert_eq!(service.live_surface_count(), Some(1));

    fixture.allocator.dispose_surface(&reader);
    assert!(wait_until(|| service.live_surface_count() == Some(0)));

    service.exit();
}

#[test]
fn child_process_reaches_service_through_child_channel() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    let fixture = ipc_fixture(ProcessRole::Child, Some(service.clone()));
    assert!(fixture.allocator.acquire_surface_texture(8, 8, false).is_some());

    fixture.locator.set_child_sender(None);
    fixture.locator.set_parent_sender(None);
    // The established connection outlives the locator's knowledge of the service.
    assert!(fixture.allocator.acquire_surface_texture(8, 8, false).is_some());

    service.exit();
}

#[test]
fn service_keeps_serving_after_a_client_stops_listening() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    let (sender, receiver) = ipc::channel().unwrap();
    drop(receiver);
    service
        .0
        .send(SurfaceAllocatorMsg::AcquireSurfaceTexture {
            width: 8,
            height: 8,
            single_buffer_mode: false,
            sender,
        })
        .unwrap();

    // The undelivered surface is not kept around.
    assert_eq!(service.live_surface_count(), Some(0));
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));
    assert!(fixture.allocator.acquire_surface_texture(8, 8, false).is_some());

    service.exit();
}

#[test]
fn dropping_the_allocator_leaves_the_service_running() {
    let service = SurfaceAllocatorService::spawn(AllocatorServiceConfig::default());
    let fixture = ipc_fixture(ProcessRole::Parent, Some(service.clone()));
    let surface = fixture.allocator.acquire_surface_texture(8, 8, false).unwrap();
    drop(fixture);

    assert!(surface.is_valid());
    assert_eq!(service.live_surface_count(), Some(1));
    let other = ipc_fixture(ProcessRole::Parent, Some(service.clone()));
    assert!(other.allocator.acquire_surface_texture(8, 8, false).is_some());
    assert_eq!(service.live_surface_count(), Some(2));

    service.exit();
    // The first allocator is gone, so nothing is left to invalidate its surface.
    thread::sleep(Duration::from_millis(300));
    assert!(surface.is_valid());
}
