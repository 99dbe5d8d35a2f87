//! Pause, abort and completion of acquisitions driven by the reference engine.

mod common;

use std::time::Duration;

use common::{eventually, explore, tiles, Rig};
use daq_acquisition::{
    AcquisitionEvent, AcquisitionSettings, AcquisitionState, FixedAreaSettings,
};
use daq_core::{ChannelSetting, DaqError, GridCell};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread")]
async fn engine_stores_requested_tiles_until_abort() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;
    let engine = rig.spawn_engine(&acq);

    acq.set_z_limits(0.0, 1.0).unwrap();
    acq.request_tile_region(0, 0, 0, 1).unwrap();
    acq.flush_requests().await.unwrap();
    assert!(eventually(|| rig.storage.image_count() == 4).await);
    assert!(eventually(|| acq.pending_tile_count() == 0).await);

    let last = acq.last_image().expect("last image");
    assert_eq!(last.slice_index(), Some(1));

    acq.abort().await.unwrap();
    assert_eq!(acq.state(), AcquisitionState::Finished);
    assert!(acq.last_image().is_none());
    assert!(rig.storage.is_finished());

    let report = engine.await.unwrap().unwrap();
    assert_eq!((report.images, report.failures), (4, 0));
    assert_eq!(rig.camera.frame_count(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_drops_queued_work() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;

    assert!(acq.toggle_pause().unwrap());
    acq.set_z_limits(0.0, 2.0).unwrap();
    acq.request_tile_region(0, 0, 1, 1).unwrap();
    acq.flush_requests().await.unwrap();
    assert_eq!(acq.queued_events().len(), 12);

    let engine = rig.spawn_engine(&acq);
    acq.abort().await.unwrap();

    assert_eq!(acq.state(), AcquisitionState::Finished);
    assert!(!acq.is_paused());
    assert_eq!(acq.pending_tile_count(), 0);
    assert_eq!(acq.pending_slice_count(), 0);
    assert!(rig.storage.is_finished());

    engine.await.unwrap().unwrap();
    assert!(acq.queued_events().is_empty());
    assert_eq!(acq.last_event(), Some(AcquisitionEvent::EngineTaskFinished));
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_leaves_only_the_sentinels() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;
    acq.toggle_pause().unwrap();
    acq.request_tile_region(0, 0, 3, 3).unwrap();
    acq.flush_requests().await.unwrap();

    // Consume manually: the first two events after abort are the sentinels.
    let consumer = {
        let acq = acq.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut seen = Vec::new();
            loop {
                let event = acq.next_event(&cancel).await.unwrap();
                seen.push(event.clone());
                match event {
                    AcquisitionEvent::AcquisitionFinished { .. } => acq.finish_output().await.unwrap(),
                    AcquisitionEvent::EngineTaskFinished => return seen,
                    AcquisitionEvent::Acquire(_) => acq.report_event_acquired(&event),
                }
            }
        })
    };

    acq.abort().await.unwrap();
    let seen = consumer.await.unwrap();
    let n = seen.len();
    assert!(n >= 2);
    assert!(matches!(seen[n - 2], AcquisitionEvent::AcquisitionFinished { acquisition } if acquisition == acq.id()));
    assert_eq!(seen[n - 1], AcquisitionEvent::EngineTaskFinished);
    assert!(tiles(&seen[..n - 2]).len() == n - 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_unblocks_a_dispatcher_waiting_on_a_full_queue() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;

    assert!(acq.toggle_pause().unwrap());
    acq.request_tile_region(0, 0, 49, 49).unwrap();
    assert!(eventually(|| acq.queued_events().len() == 2000).await);
    // The tile blocked in submit is already reserved.
    assert!(eventually(|| acq.pending_tile_count() == 2001).await);

    let abort = {
        let acq = acq.clone();
        tokio::spawn(async move { acq.abort().await })
    };
    assert!(eventually(|| acq.state() == AcquisitionState::Finishing).await);

    let queued = acq.queued_events();
    assert_eq!(queued.len(), 2);
    assert!(matches!(queued[0], AcquisitionEvent::AcquisitionFinished { .. }));
    assert_eq!(queued[1], AcquisitionEvent::EngineTaskFinished);
    assert_eq!(acq.pending_tile_count(), 0);
    assert!(!acq.is_paused());

    let engine = rig.spawn_engine(&acq);
    abort.await.unwrap().unwrap();
    engine.await.unwrap().unwrap();
    assert_eq!(acq.state(), AcquisitionState::Finished);
    assert_eq!(acq.last_event(), Some(AcquisitionEvent::EngineTaskFinished));
    assert_eq!(rig.storage.image_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_is_idempotent() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;
    let engine = rig.spawn_engine(&acq);

    acq.abort().await.unwrap();
    acq.abort().await.unwrap();
    assert_eq!(acq.state(), AcquisitionState::Finished);

    engine.await.unwrap().unwrap();
    assert!(acq.queued_events().is_empty());
    acq.abort().await.unwrap();
    assert!(acq.queued_events().is_empty());
    assert!(matches!(
        acq.request_tile_at_current_position(),
        Err(DaqError::InvalidTransition { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_before_initialize_finishes_immediately() {
    let rig = Rig::new();
    let acq = rig.create(explore(Vec::new())).await.unwrap();
    acq.abort().await.unwrap();
    assert!(acq.is_finished());
    assert!(acq.initialize().await.is_err());
    assert!(rig.storage.summary().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_summary_leaves_the_acquisition_uninitialized() {
    let rig = Rig::new();
    rig.storage.reject_summary_metadata(true);
    let acq = rig.create(explore(vec![ChannelSetting::new("DAPI")])).await.unwrap();

    assert!(matches!(acq.initialize().await, Err(DaqError::Storage(_))));
    assert_eq!(acq.state(), AcquisitionState::Created);
    assert!(matches!(
        acq.start().await,
        Err(DaqError::InvalidTransition { action: "start", .. })
    ));

    let frame = daq_core::Frame::from_u8(1, 1, vec![1]);
    let image = daq_core::TaggedImage::new(frame)
        .with_tag(daq_core::data::tags::POSITION_INDEX, 0)
        .with_tag(daq_core::data::tags::SLICE_INDEX, 0);
    acq.add_image(image, &CancellationToken::new()).await.unwrap();
    assert!(acq.last_image().is_none());

    acq.abort().await.unwrap();
    assert_eq!(acq.state(), AcquisitionState::Finished);
    assert!(acq.queued_events().is_empty());
    assert_eq!(rig.storage.image_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn paused_queue_holds_events_in_order() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;
    let cancel = CancellationToken::new();

    assert!(acq.toggle_pause().unwrap());
    assert_eq!(acq.state(), AcquisitionState::Paused);
    acq.set_z_limits(0.0, 2.0).unwrap();
    acq.request_tile_at_current_position().unwrap();
    acq.request_tile_region(0, 1, 0, 1).unwrap();
    acq.flush_requests().await.unwrap();
    let queued = acq.queued_events();
    assert_eq!(queued.len(), 4);

    let blocked = tokio::time::timeout(Duration::from_millis(50), acq.next_event(&cancel)).await;
    assert!(blocked.is_err());

    assert!(!acq.toggle_pause().unwrap());
    assert_eq!(acq.state(), AcquisitionState::Running);
    let mut taken = Vec::new();
    for _ in 0..4 {
        taken.push(acq.next_event(&cancel).await.unwrap());
    }
    assert_eq!(taken, queued);
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_is_rejected_outside_running() {
    let rig = Rig::new();
    let acq = rig.create(explore(Vec::new())).await.unwrap();
    assert!(matches!(acq.toggle_pause(), Err(DaqError::InvalidTransition { .. })));
    acq.initialize().await.unwrap();
    assert!(matches!(acq.toggle_pause(), Err(DaqError::InvalidTransition { .. })));
    assert!(acq.start().await.is_ok());
    assert!(acq.start().await.is_err());
    assert!(acq.toggle_pause().unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn images_after_finish_are_dropped() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;
    let engine = rig.spawn_engine(&acq);
    acq.abort().await.unwrap();
    engine.await.unwrap().unwrap();

    let frame = daq_core::Frame::from_u8(1, 1, vec![1]);
    let image = daq_core::TaggedImage::new(frame)
        .with_tag(daq_core::data::tags::POSITION_INDEX, 0)
        .with_tag(daq_core::data::tags::SLICE_INDEX, 0);
    acq.add_image(image, &CancellationToken::new()).await.unwrap();
    assert!(acq.last_image().is_none());
    assert_eq!(rig.storage.image_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn fixed_area_runs_its_plan_to_completion() {
    let rig = Rig::new();
    let plan = FixedAreaSettings {
        positions: vec![GridCell::new(0, 0), GridCell::new(0, 1)],
        z_start: 1.0,
        z_end: 0.0,
        num_frames: 2,
    };
    let settings = AcquisitionSettings::fixed_area("plan", 1.0, plan);
    let acq = rig.launch(settings).await;
    assert!(matches!(
        acq.request_tile_at_current_position(),
        Err(DaqError::Configuration(_))
    ));

    let report = rig.spawn_engine(&acq).await.unwrap().unwrap();
    assert_eq!(report.images, 8);

    let sink = acq.wait_until_closed(Duration::from_secs(5)).await.unwrap();
    assert_eq!((sink.stored, sink.failed), (8, 0));
    assert_eq!(acq.state(), AcquisitionState::Finished);
    assert_eq!(rig.storage.image_count(), 8);
    assert_eq!((acq.min_slice_index(), acq.max_slice_index()), (0, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn camera_failures_are_counted_and_skipped() {
    let rig = Rig::new();
    let acq = rig.launch(explore(vec![ChannelSetting::new("DAPI")])).await;
    rig.camera.errors().fail("snap");
    let engine = rig.spawn_engine(&acq);

    acq.request_tile_at_current_position().unwrap();
    acq.flush_requests().await.unwrap();
    assert!(eventually(|| acq.pending_tile_count() == 0).await);

    acq.abort().await.unwrap();
    let report = engine.await.unwrap().unwrap();
    assert_eq!((report.images, report.failures), (0, 1));
    assert_eq!(rig.storage.image_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_fails_without_focus_limits() {
    let rig = Rig::new();
    rig.focus.errors().fail("limits");
    let err = rig.create(explore(Vec::new())).await.err().expect("create fails");
    assert!(matches!(err, DaqError::Hardware { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn summary_metadata_describes_the_dataset() {
    let rig = Rig::new();
    let acq = rig
        .launch(
            explore(vec![ChannelSetting::new("GFP"), ChannelSetting::new("RFP")]).with_overlap(25.0),
        )
        .await;

    let summary = rig.storage.summary().expect("summary recorded");
    assert_eq!(summary["Prefix"], "explore");
    assert_eq!(summary["GridPixelOverlapX"], 4);
    assert_eq!(summary["Channels"], 2);
    assert_eq!(acq.name(), "explore");
    assert_eq!(acq.overlap().x, 4);
    assert_eq!(acq.channel_names(), vec!["GFP".to_string(), "RFP".to_string()]);
    assert!(acq.start_time().is_some());
}
