//! Context graph behavior: mute, volume, pause scopes and stop.

mod common;

use cadence_kernel::prelude::*;
use common::*;

/// `all` ─┬─ `music` ── `stingers`
///        └─ `sfx`
fn mixer() -> (TestRegistry, [InstanceHandle; 4]) {
    let mut sounds = registry();
    register(&mut sounds, "all", &["ambience"]);
    register(&mut sounds, "music", &["theme"]);
    register(&mut sounds, "stingers", &["hit"]);
    register(&mut sounds, "sfx", &["click"]);
    sounds.link_contexts("all", &["music", "sfx"]).expect("link");
    sounds.link_contexts("music", &["stingers"]).expect("link");

    let mut handles = Vec::new();
    for alias in ["ambience", "theme", "hit", "click"] {
        load(&mut sounds, alias);
        handles.push(sounds.play(alias, PlayOptions::new()).expect("play"));
    }
    (sounds, [handles[0], handles[1], handles[2], handles[3]])
}

fn channel_volume(sounds: &TestRegistry, handle: InstanceHandle) -> f32 {
    let channel = sounds.instance(handle).and_then(PlaybackInstance::channel).expect("channel");
    sounds.backend().channel(channel).volume
}

#[test]
fn test_mute_reaches_children_only() {
    let (mut sounds, [ambience, theme, hit, click]) = mixer();

    sounds.set_context_mute("music", true).expect("mute");

    assert_eq!(channel_volume(&sounds, theme), 0.0);
    assert_eq!(channel_volume(&sounds, hit), 0.0);
    assert!(approx(channel_volume(&sounds, click), 1.0));
    assert!(approx(channel_volume(&sounds, ambience), 1.0));
    assert!(sounds.context("stingers").expect("ctx").is_muted());
    assert!(!sounds.context("all").expect("ctx").is_muted());

    sounds.set_context_mute("music", false).expect("unmute");
    assert!(approx(channel_volume(&sounds, theme), 1.0));
    assert!(approx(channel_volume(&sounds, hit), 1.0));
}

#[test]
fn test_mute_keeps_instance_volume() {
    let (mut sounds, [_, theme, _, _]) = mixer();
    sounds.set_instance_volume(theme, 0.6).expect("volume");

    sounds.set_context_mute("music", true).expect("mute");
    assert!(approx(sounds.instance(theme).expect("live").volume(), 0.6));

    sounds.set_context_mute("music", false).expect("unmute");
    assert!(approx(channel_volume(&sounds, theme), 0.6));
}

#[test]
fn test_context_volume_touches_direct_members_only() {
    let (mut sounds, [ambience, theme, hit, _]) = mixer();

    sounds.set_context_volume("music", 0.5).expect("volume");

    assert!(approx(channel_volume(&sounds, theme), 0.5));
    assert!(approx(channel_volume(&sounds, hit), 1.0));
    assert!(approx(channel_volume(&sounds, ambience), 1.0));

    sounds.set_context_volume("music", 3.0).expect("volume");
    assert!(approx(sounds.context("music").expect("ctx").volume(), 1.0));
}

#[test]
fn test_unknown_context_is_reported() {
    let (mut sounds, _) = mixer();
    let missing = SoundError::UnknownContext("nope".into());

    assert_eq!(sounds.set_context_mute("nope", true), Err(missing.clone()));
    assert_eq!(sounds.set_context_volume("nope", 0.5), Err(missing.clone()));
    assert_eq!(sounds.pause_context("nope"), Err(missing.clone()));
    assert_eq!(sounds.resume_context("nope"), Err(missing.clone()));
    assert_eq!(sounds.stop_context("nope"), Err(missing));
    assert!(!sounds.context_exists("nope"));
}

#[test]
fn test_pause_context_descends() {
    let (mut sounds, [ambience, theme, hit, click]) = mixer();

    sounds.pause_context("music").expect("pause");

    for handle in [theme, hit] {
        assert!(sounds.instance(handle).expect("live").is_paused());
    }
    for handle in [ambience, click] {
        assert!(!sounds.instance(handle).expect("live").is_paused());
    }

    sounds.resume_context("music").expect("resume");
    assert!(!sounds.instance(hit).expect("live").is_paused());
}

#[test]
fn test_resume_all_skips_individual_pauses() {
    let (mut sounds, [ambience, theme, _, _]) = mixer();

    sounds.pause("theme").expect("pause");
    sounds.pause_all();
    assert!(sounds.instance(ambience).expect("live").is_globally_paused());
    assert!(!sounds.instance(theme).expect("live").is_globally_paused());

    sounds.resume_all();
    assert!(!sounds.instance(ambience).expect("live").is_paused());
    assert!(sounds.instance(theme).expect("live").is_paused());

    sounds.resume("theme").expect("resume");
    assert!(!sounds.instance(theme).expect("live").is_paused());
}

#[test]
fn test_pause_all_reaches_pending_and_backend() {
    let (mut sounds, [ambience, _, _, _]) = mixer();
    register(&mut sounds, "ui", &["silent", "tap"]);
    let pending = sounds.play("tap", PlayOptions::new()).expect("deferred play");

    sounds.pause_all();
    let channel = sounds.instance(ambience).and_then(PlaybackInstance::channel).expect("channel");
    assert!(sounds.backend().channel(channel).paused);
    assert!(sounds.instance(pending).expect("pending").is_globally_paused());

    sounds.resume_all();
    assert!(!sounds.backend().channel(channel).paused);
    assert!(!sounds.instance(pending).expect("pending").is_paused());
}

#[test]
fn test_individual_resume_skips_global_pause() {
    let (mut sounds, [_, theme, _, _]) = mixer();

    sounds.pause_all();
    sounds.resume("theme").expect("resume");
    assert!(sounds.instance(theme).expect("live").is_paused());

    sounds.resume_all();
    assert!(!sounds.instance(theme).expect("live").is_paused());
}

#[test]
fn test_resume_context_clears_global_pause() {
    let (mut sounds, [_, theme, _, _]) = mixer();

    sounds.pause_all();
    sounds.resume_context("music").expect("resume");

    let inst = sounds.instance(theme).expect("live");
    assert!(!inst.is_paused());
    assert!(!inst.is_globally_paused());
}

#[test]
fn test_stop_context_stops_descendants_and_pending() {
    let mut sounds = registry();
    register(&mut sounds, "music", &["theme"]);
    register(&mut sounds, "stingers", &["hit"]);
    register(&mut sounds, "sfx", &["click"]);
    sounds.link_contexts("music", &["stingers"]).expect("link");
    load(&mut sounds, "theme");
    load(&mut sounds, "click");

    sounds.play("theme", PlayOptions::new()).expect("play");
    sounds.play("hit", PlayOptions::new()).expect("pending");
    sounds.play("click", PlayOptions::new()).expect("play");

    sounds.stop_context("music").expect("stop");

    assert!(!sounds.is_playing("theme"));
    assert!(!sounds.is_playing("hit"));
    assert!(!sounds.definition("hit").expect("def").plays_after_load());
    assert!(sounds.is_playing("click"));
}

#[test]
fn test_shared_child_handled_once() {
    let mut sounds = registry();
    register(&mut sounds, "shared", &["hit"]);
    sounds.link_contexts("left", &["shared"]).expect("link");
    sounds.link_contexts("right", &["shared"]).expect("link");
    sounds.link_contexts("root", &["left", "right"]).expect("link");
    load(&mut sounds, "hit");
    let handle = sounds.play("hit", PlayOptions::new()).expect("play");

    sounds.pause_context("root").expect("pause");
    assert!(sounds.instance(handle).expect("live").is_paused());
    sounds.set_context_mute("root", true).expect("mute");
    assert_eq!(channel_volume(&sounds, handle), 0.0);
}

#[test]
fn test_link_rejects_cycles() {
    let mut sounds = registry();
    sounds.link_contexts("a", &["b"]).expect("link");
    sounds.link_contexts("b", &["c"]).expect("link");
    register(&mut sounds, "c", &["x"]);

    let err = sounds.link_contexts("c", &["a"]).expect_err("cycle");
    assert!(matches!(err, SoundError::ContextCycle { .. }));

    // Propagation still terminates.
    sounds.set_context_mute("a", true).expect("mute");
    assert!(sounds.context("c").expect("ctx").is_muted());
}

#[test]
fn test_link_creates_parent_lazily() {
    let mut sounds = registry();
    assert!(!sounds.context_exists("master"));
    sounds.link_contexts("master", &["music", "music"]).expect("link");

    let master = sounds.context("master").expect("created");
    assert_eq!(master.children(), ["music".to_string()]);
}
