//! Registration, loading and playback through the public registry API.

mod common;

use std::path::PathBuf;

use cadence_kernel::prelude::*;
use common::*;

#[test]
fn test_registered_sounds_start_unloaded() {
    let mut sounds = registry_with_sounds("sfx", &["click", "boom"]);

    assert!(sounds.is_unloaded("click"));
    assert!(sounds.context("sfx").is_some());
    assert_eq!(sounds.load_state("missing"), None);

    sounds.preload(&["click"], None).expect("preload");
    assert!(sounds.is_loading("click"));
    assert!(sounds.is_unloaded("boom"));

    complete_loads(&mut sounds);
    assert!(sounds.is_loaded("click"));
}

#[test]
fn test_preload_submits_resolved_paths() {
    let mut sounds = registry();
    let config = ContextConfig::new("music")
        .with_path("audio/")
        .with_sound(SoundSettings::new("theme").with_src("bgm/theme").with_looping(true));
    sounds.register_context(config).expect("register");

    sounds.preload(&["theme"], None).expect("preload");

    let batch = sounds.loader().last_batch();
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].alias, "theme");
    assert_eq!(batch.items[0].source_path, PathBuf::from("audio/bgm/theme.ogg"));
}

#[test]
fn test_preload_flags_submit_on_registration() {
    let mut sounds = registry();
    let config = ContextConfig::new("sfx")
        .with_sound("a")
        .with_sound(SoundSettings::new("b").with_preload(true));
    sounds.register_context(config).expect("register");

    assert!(sounds.is_unloaded("a"));
    assert!(sounds.is_loading("b"));

    sounds
        .register_context(ContextConfig::new("vo").with_preload(true).with_sound("line"))
        .expect("register");
    assert!(sounds.is_loading("line"));
}

#[test]
fn test_play_unloaded_defers_and_preloads_once() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);

    let first = sounds.play("click", PlayOptions::new()).expect("pending");
    let second = sounds.play("click", PlayOptions::new()).expect("pending");

    assert_eq!(sounds.loader().requests_for("click"), 1);
    assert!(sounds.instance(first).expect("live").is_pending());
    let def = sounds.definition("click").expect("registered");
    assert_eq!(def.pending_instances(), [first, second]);
    assert!(def.plays_after_load());
    assert!(sounds.is_playing("click"));
    assert!(sounds.backend().started.is_empty());

    complete_loads(&mut sounds);

    let def = sounds.definition("click").expect("registered");
    assert!(def.pending_instances().is_empty());
    assert_eq!(def.active_instances(), [first, second]);
    assert!(!def.plays_after_load());
    assert_eq!(sounds.backend().started.len(), 2);
    assert!(!sounds.instance(first).expect("live").is_pending());
}

#[test]
fn test_play_loaded_starts_immediately() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    load(&mut sounds, "click");

    let (started, make) = counter();
    let handle = sounds
        .play(
            "click",
            PlayOptions::new()
                .on_start(make())
                .with_volume(0.5)
                .with_pan(-0.5)
                .with_delay_ms(20)
                .with_offset_ms(100),
        )
        .expect("started");

    assert_eq!(started.get(), 1);
    let inst = sounds.instance(handle).expect("live");
    assert!(inst.channel().is_some());
    assert_eq!(inst.length_ms(), 1_000);

    let channel = sounds.backend().last_channel();
    assert!(approx(channel.volume, 0.5));
    assert!(approx(channel.pan, -0.5));
    assert_eq!(channel.params.delay_ms, 20);
    assert_eq!(channel.params.offset_ms, 100);
}

#[test]
fn test_loop_settings_map_to_native_counts() {
    let mut sounds = registry();
    let config = ContextConfig::new("music")
        .with_sound("once")
        .with_sound(SoundSettings::new("bed").with_looping(true));
    sounds.register_context(config).expect("register");
    load(&mut sounds, "once");
    load(&mut sounds, "bed");

    sounds.play("once", PlayOptions::new().with_loop(true)).expect("play");
    assert_eq!(sounds.backend().last_channel().params.loop_count, LOOP_INFINITE);

    sounds.play("once", PlayOptions::new()).expect("play");
    assert_eq!(sounds.backend().last_channel().params.loop_count, 0);

    sounds.play("bed", PlayOptions::new()).expect("play");
    assert_eq!(sounds.backend().last_channel().params.loop_count, LOOP_INFINITE);

    sounds.play("bed", PlayOptions::new().with_loop(2)).expect("play");
    assert_eq!(sounds.backend().last_channel().params.loop_count, 2);
}

#[test]
fn test_default_volume_scaled_by_context() {
    let mut sounds = registry();
    let config = ContextConfig::new("music").with_sound(SoundSettings::new("theme").with_volume(0.8));
    sounds.register_context(config).expect("register");
    sounds.set_context_volume("music", 0.5).expect("volume");
    load(&mut sounds, "theme");

    let handle = sounds.play("theme", PlayOptions::new()).expect("play");

    assert!(approx(sounds.instance(handle).expect("live").volume(), 0.8));
    assert!(approx(sounds.backend().last_channel().volume, 0.4));
    assert!(approx(sounds.effective_volume(handle).expect("live"), 0.4));
}

#[test]
fn test_unknown_alias_completes_immediately() {
    let mut sounds = registry();
    let (completed, make) = counter();

    let err = sounds
        .play("nope", PlayOptions::new().on_complete(make()))
        .expect_err("unknown");

    assert_eq!(err, SoundError::UnknownAlias("nope".into()));
    assert_eq!(completed.get(), 1);
    assert_eq!(sounds.pool().in_use(), 0);
}

#[test]
fn test_start_failure_completes_and_returns_no_handle() {
    let mut backend = MockBackend::default();
    backend.fail.insert("broken".into());
    let (mut sounds, _clock) = registry_with(backend);
    register(&mut sounds, "sfx", &["broken"]);
    load(&mut sounds, "broken");

    let (completed, make) = counter();
    let (started, make_start) = counter();
    let err = sounds
        .play("broken", PlayOptions::new().on_complete(make()).on_start(make_start()))
        .expect_err("start failure");

    assert_eq!(err, SoundError::StartFailed("broken".into()));
    assert_eq!(completed.get(), 1);
    assert_eq!(started.get(), 0);
    assert_eq!(sounds.pool().in_use(), 0);
    assert!(!sounds.is_playing("broken"));
}

#[test]
fn test_natural_completion_releases_and_calls_back() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    load(&mut sounds, "click");

    let (completed, make) = counter();
    let handle = sounds
        .play("click", PlayOptions::new().on_complete(make()))
        .expect("play");
    let channel = sounds.instance(handle).and_then(PlaybackInstance::channel).expect("channel");

    sounds.backend_mut().finish(channel);
    sounds.poll_channels();

    assert_eq!(completed.get(), 1);
    assert!(sounds.instance(handle).is_none());
    assert!(!sounds.is_playing("click"));
    assert_eq!(sounds.pool().available(), 1);

    // A late duplicate report is ignored.
    sounds.on_channel_complete(channel);
    assert_eq!(completed.get(), 1);
}

#[test]
fn test_stop_does_not_call_on_complete() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    load(&mut sounds, "click");

    let (completed, make) = counter();
    sounds
        .play("click", PlayOptions::new().on_complete(make()))
        .expect("play");
    sounds.stop("click").expect("stop");

    assert_eq!(completed.get(), 0);
    assert_eq!(sounds.backend().live_channels(), 0);
    assert_eq!(sounds.stop("nope"), Err(SoundError::UnknownAlias("nope".into())));
}

#[test]
fn test_stop_while_loading_skips_deferred_playback() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    sounds.play("click", PlayOptions::new()).expect("pending");
    sounds.play("click", PlayOptions::new()).expect("pending");

    sounds.stop("click").expect("stop");
    assert_eq!(sounds.pool().available(), 2);
    assert!(!sounds.definition("click").expect("def").plays_after_load());

    complete_loads(&mut sounds);
    assert!(sounds.is_loaded("click"));
    assert!(sounds.backend().started.is_empty());
}

#[test]
fn test_stop_all_covers_every_alias() {
    let mut sounds = registry_with_sounds("sfx", &["a", "b"]);
    load(&mut sounds, "a");
    sounds.play("a", PlayOptions::new()).expect("play");
    sounds.play("b", PlayOptions::new()).expect("pending");

    sounds.stop_all();

    assert!(!sounds.is_playing("a"));
    assert!(!sounds.is_playing("b"));
    assert_eq!(sounds.pool().in_use(), 0);
}

#[test]
fn test_failed_load_releases_pending_and_completes() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    let (completed, make) = counter();
    sounds
        .play("click", PlayOptions::new().on_complete(make()))
        .expect("pending");

    let batch = sounds.loader().last_batch().id;
    sounds.handle_load_event(LoadEvent::Failed {
        batch,
        alias: "click".into(),
        reason: "missing file".into(),
    });

    assert!(sounds.is_unloaded("click"));
    assert_eq!(completed.get(), 1);
    assert_eq!(sounds.pool().in_use(), 0);

    // The alias can be requested again.
    sounds.play("click", PlayOptions::new()).expect("pending");
    assert_eq!(sounds.loader().requests_for("click"), 2);
}

#[test]
fn test_preload_callback_waits_for_batch() {
    let mut sounds = registry_with_sounds("sfx", &["a", "b"]);
    let (done, make) = counter();

    sounds.preload(&["a", "b"], Some(make())).expect("preload");
    assert_eq!(done.get(), 0);
    assert_eq!(sounds.loader().last_batch().items.len(), 2);

    complete_loads(&mut sounds);
    assert_eq!(done.get(), 1);
}

#[test]
fn test_preload_with_nothing_to_load_calls_back_now() {
    let mut sounds = registry_with_sounds("sfx", &["a"]);
    load(&mut sounds, "a");
    let (done, make) = counter();

    sounds.preload(&["a"], Some(make())).expect("preload");
    assert_eq!(done.get(), 1);

    let empty: [&str; 0] = [];
    sounds.preload(&empty, Some(make())).expect("preload");
    assert_eq!(done.get(), 2);
    assert_eq!(sounds.loader().batches.len(), 1);
}

#[test]
fn test_preload_reports_unknown_but_loads_known() {
    let mut sounds = registry_with_sounds("sfx", &["a"]);

    let err = sounds.preload(&["ghost", "a"], None).expect_err("unknown");

    assert_eq!(err, SoundError::UnknownAlias("ghost".into()));
    assert!(sounds.is_loading("a"));
}

#[test]
fn test_paused_while_loading_starts_paused() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    let (started, make) = counter();
    let handle = sounds
        .play("click", PlayOptions::new().on_start(make()))
        .expect("pending");

    sounds.pause_instance(handle).expect("pause");
    complete_loads(&mut sounds);

    assert_eq!(started.get(), 1);
    let inst = sounds.instance(handle).expect("live");
    assert!(inst.is_paused());
    assert!(sounds.backend().last_channel().paused);
}

#[test]
fn test_duration_is_cached_once_loaded() {
    let mut backend = MockBackend::default();
    backend.durations.insert("theme".into(), 42_000);
    let (mut sounds, _clock) = registry_with(backend);
    register(&mut sounds, "music", &["theme"]);

    assert_eq!(sounds.duration_ms("missing"), None);
    assert_eq!(sounds.duration_ms("theme"), Some(0));

    load(&mut sounds, "theme");
    assert_eq!(sounds.duration_ms("theme"), Some(42_000));
    assert_eq!(sounds.definition("theme").expect("def").cached_duration_ms(), Some(42_000));
}

#[test]
fn test_instance_controls_reach_backend() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    load(&mut sounds, "click");
    let handle = sounds.play("click", PlayOptions::new()).expect("play");
    let channel = sounds.instance(handle).and_then(PlaybackInstance::channel).expect("channel");

    sounds.set_instance_volume(handle, 0.25).expect("volume");
    sounds.set_instance_pan(handle, 2.0).expect("pan");
    assert!(approx(sounds.backend().channel(channel).volume, 0.25));
    assert!(approx(sounds.backend().channel(channel).pan, 1.0));

    sounds.pause_instance(handle).expect("pause");
    assert!(sounds.backend().channel(channel).paused);
    sounds.resume_instance(handle).expect("resume");
    assert!(!sounds.backend().channel(channel).paused);

    sounds.stop_instance(handle).expect("stop");
    assert!(sounds.backend().channel(channel).stopped);
    assert_eq!(sounds.stop_instance(handle), Err(SoundError::InvalidHandle));
    assert_eq!(sounds.set_instance_volume(handle, 1.0), Err(SoundError::InvalidHandle));
}

#[test]
fn test_mute_all_forwards_to_backend() {
    let mut sounds = registry();
    sounds.set_mute_all(true);
    assert!(sounds.is_muted_all());
    assert!(sounds.backend().muted);
    sounds.set_mute_all(false);
    assert!(!sounds.backend().muted);
}

#[test]
fn test_legacy_options_play_like_builder() {
    let mut sounds = registry_with_sounds("sfx", &["click"]);
    load(&mut sounds, "click");

    let options = PlayOptions::legacy(None, None, true, 5, 0, Some(LoopMode::Count(1)), Some(0.3), 0.0);
    sounds.play("click", options).expect("play");

    let params = sounds.backend().last_channel().params;
    assert!(params.interrupt);
    assert_eq!(params.delay_ms, 5);
    assert_eq!(params.loop_count, 1);
    assert!(approx(params.volume, 0.3));
}
