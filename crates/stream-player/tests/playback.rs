mod support;

use std::thread;
use std::time::Duration;

use stream_player::{PlaybackState, TransportErrorKind};
use support::{Event, Harness, RecordingSink, Script, ScriptedTransport, gated_track, wait_until};

#[test]
fn progress_is_monotonic_and_pauses_with_playback() {
    let (script, gate) = gated_track(0x11);
    let h = Harness::new(ScriptedTransport::default().with("mem://track", script));
    let c = &h.controller;

    c.play_track("mem://track");
    assert!(c.in_progress());
    let mut seen = Vec::new();

    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    seen.push(c.get_last_progress());

    c.pause();
    assert!(wait_until(|| c.state() == PlaybackState::Paused));
    gate.send(()).unwrap();
    assert!(wait_until(|| c.download_progress() >= 0.5));
    let while_paused = h.quiet_events(Duration::from_millis(100));
    assert!(!while_paused.contains(&Event::Progress), "{while_paused:?}");
    assert_eq!(c.get_last_progress(), 0.0);

    c.resume();
    assert!(h.wait_for(Event::Progress));
    seen.push(c.get_last_progress());
    assert_eq!(c.state(), PlaybackState::Playing);

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Finished));
    loop {
        let value = c.get_last_progress();
        if value == 0.0 {
            break;
        }
        seen.push(value);
    }

    assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.iter().filter(|v| **v == 1.0).count(), 1);
    assert!(!c.in_progress());
    assert_eq!(c.download_progress(), 1.0);

    let sink = h.sink.lock().unwrap();
    assert_eq!(sink.opens, vec![(16, 1, 1000)]);
    assert_eq!(sink.written.len(), 1000);
    assert_eq!(sink.drains, 1);
    assert_eq!(sink.closes, 0);
}

#[test]
fn seek_before_format_is_known_is_ignored() {
    let (script, gate) = gated_track(0x22);
    let h = Harness::new(ScriptedTransport::default().with("mem://track", script));
    let c = &h.controller;

    c.play_track("mem://track");
    c.seek(5.0);
    thread::sleep(Duration::from_millis(50));
    for _ in 0..4 {
        gate.send(()).unwrap();
    }
    assert!(h.wait_for(Event::Finished));

    let log = h.decoder(0);
    let log = log.lock().unwrap();
    assert!(log.restarts.is_empty());
    assert_eq!(log.fed, vec![0x22; 1000]);
}

#[test]
fn seek_past_downloaded_bytes_keeps_position() {
    let (script, gate) = gated_track(0x33);
    let h = Harness::new(ScriptedTransport::default().with("mem://track", script));
    let c = &h.controller;

    c.play_track("mem://track");
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.25);

    // 0.9 s at 1000 samples/s maps to byte 900; only 250 are downloaded.
    c.seek(0.9);
    thread::sleep(Duration::from_millis(50));
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.5);

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Finished));
    let log = h.decoder(0);
    let log = log.lock().unwrap();
    assert!(log.restarts.is_empty());
    assert_eq!(log.fed.len(), 1000);
}

#[test]
fn seek_inside_downloaded_bytes_restarts_decoder() {
    let (script, gate) = gated_track(0x44);
    let h = Harness::new(ScriptedTransport::default().with("mem://track", script));
    let c = &h.controller;

    c.play_track("mem://track");
    gate.send(()).unwrap();
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.25);
    assert_eq!(c.get_last_progress(), 0.5);

    c.seek(0.25);
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.5);
    assert_eq!(h.decoder(0).lock().unwrap().restarts, vec![250]);

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Finished));
    // Bytes 250..500 were fed a second time after the restart.
    assert_eq!(h.decoder(0).lock().unwrap().fed.len(), 1250);
}

#[test]
fn small_volume_changes_are_coalesced() {
    let (script, gate) = gated_track(0x55);
    let h = Harness::new(ScriptedTransport::default().with("mem://track", script));
    let c = &h.controller;

    c.change_volume(0.5005);
    assert_eq!(c.volume(), 0.5);

    c.play_track("mem://track");
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(h.sink.lock().unwrap().volumes, vec![0.5]);

    c.change_volume(0.5009);
    assert_eq!(c.volume(), 0.5);
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(h.sink.lock().unwrap().volumes, vec![0.5]);

    c.change_volume(0.8);
    assert_eq!(c.volume(), 0.8);
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(h.sink.lock().unwrap().volumes, vec![0.5, 0.8]);

    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Finished));
}

#[test]
fn stop_is_idempotent_and_silences_the_delegate() {
    let h = Harness::new(
        ScriptedTransport::default().with("mem://live", Script::Endless { fill: 0x66, chunk: 64 }),
    );
    let c = &h.controller;

    c.stop();
    assert_eq!(c.state(), PlaybackState::Idle);

    c.play_track("mem://live");
    assert!(h.wait_for(Event::Started));
    c.stop();
    assert_eq!(c.state(), PlaybackState::Idle);
    assert!(!c.in_progress());
    assert_eq!(h.transport.log(), vec!["start mem://live", "end mem://live"]);

    let _ = h.events.try_iter().count();
    thread::sleep(Duration::from_millis(50));
    assert!(h.events.try_recv().is_err());

    c.stop();
    assert_eq!(c.state(), PlaybackState::Idle);
    assert_eq!(c.download_progress(), 0.0);
    assert_eq!(h.sink.lock().unwrap().closes, 1);
}

#[test]
fn next_track_waits_for_previous_workers() {
    let b = Script::Chunks {
        chunks: Script::split(&[0xBB; 1000], 250),
        total: Some(1000),
        gate: None,
    };
    let h = Harness::new(
        ScriptedTransport::default()
            .with("mem://a", Script::Endless { fill: 0xAA, chunk: 64 })
            .with("mem://b", b),
    );
    let c = &h.controller;

    c.play_track("mem://a");
    assert!(h.wait_for(Event::Started));
    c.play_track("mem://b");
    assert!(wait_until(|| !c.in_progress()));

    assert_eq!(
        h.transport.log(),
        vec!["start mem://a", "end mem://a", "start mem://b", "end mem://b"]
    );
    assert!(h.decoder(0).lock().unwrap().fed.iter().all(|b| *b == 0xAA));
    assert_eq!(h.decoder(1).lock().unwrap().fed, vec![0xBB; 1000]);

    let sink = h.sink.lock().unwrap();
    assert_eq!(sink.opens.len(), 2);
    let tail = &sink.written[sink.written.len() - 1000..];
    assert!(tail.iter().all(|b| *b == 0xBB));
    assert_eq!(sink.written.iter().filter(|b| **b == 0xBB).count(), 1000);
}

#[test]
fn transport_failure_finishes_without_audio() {
    let h = Harness::new(
        ScriptedTransport::default().with("mem://down", Script::Fail(TransportErrorKind::Timeout)),
    );
    let c = &h.controller;

    c.play_track("mem://down");
    assert!(h.wait_for(Event::Finished));
    assert!(wait_until(|| !c.in_progress()));
    let sink = h.sink.lock().unwrap();
    assert!(sink.opens.is_empty());
    assert_eq!(sink.closes + sink.drains, 0);
}

#[test]
fn refused_sink_ends_the_track() {
    let (mut sink, log) = RecordingSink::new();
    sink.accept_open = false;
    let track = Script::Chunks {
        chunks: Script::split(&[0x77; 1000], 250),
        total: Some(1000),
        gate: None,
    };
    let h = Harness::with_sink(ScriptedTransport::default().with("mem://track", track), sink, log);
    let c = &h.controller;

    c.play_track("mem://track");
    assert!(h.wait_for(Event::Finished));
    assert!(wait_until(|| !c.in_progress()));
    assert!(h.sink.lock().unwrap().written.is_empty());
    assert_eq!(c.get_last_progress(), 0.0);
}

#[test]
fn dropping_the_controller_stops_the_download() {
    let h = Harness::new(
        ScriptedTransport::default().with("mem://live", Script::Endless { fill: 0x88, chunk: 32 }),
    );
    h.controller.play_track("mem://live");
    assert!(h.wait_for(Event::Started));

    let transport = h.transport.clone();
    drop(h);
    assert_eq!(transport.log(), vec!["start mem://live", "end mem://live"]);
}

#[test]
fn unreachable_seek_targets_are_ignored() {
    let (script, gate) = gated_track(0x99);
    let h = Harness::new(ScriptedTransport::default().with("mem://track", script));
    let c = &h.controller;

    c.play_track("mem://track");
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.25);

    c.seek(f64::INFINITY);
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.5);

    c.seek(f64::NAN);
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Progress));
    assert_eq!(c.get_last_progress(), 0.75);

    // Saturates to the largest sample index; the decoder maps it past the buffer.
    c.seek(1e300);
    gate.send(()).unwrap();
    assert!(h.wait_for(Event::Finished));
    assert_eq!(c.get_last_progress(), 1.0);

    let log = h.decoder(0);
    let log = log.lock().unwrap();
    assert_eq!(log.seeks, vec![u64::MAX]);
    assert!(log.restarts.is_empty());
    assert_eq!(log.fed.len(), 1000);
}

#[test]
fn panicking_decoder_ends_the_track() {
    let track = Script::Chunks {
        chunks: Script::split(&[0xAB; 1000], 250),
        total: Some(1000),
        gate: None,
    };
    let h =
        Harness::with_panicking_decoder(ScriptedTransport::default().with("mem://track", track));
    let c = &h.controller;

    c.play_track("mem://track");
    assert!(h.wait_for(Event::Finished));
    assert!(!c.in_progress());

    let sink = h.sink.lock().unwrap();
    assert_eq!(sink.opens.len(), 1);
    assert!(sink.written.is_empty());
    assert_eq!(sink.closes, 1);
    assert_eq!(sink.drains, 0);
}

#[test]
fn panicking_transport_lets_playback_finish() {
    let h = Harness::new(
        ScriptedTransport::default().with("mem://bad", Script::Panic { before: 300 }),
    );
    let c = &h.controller;

    c.play_track("mem://bad");
    assert!(h.wait_for(Event::Finished));
    assert!(!c.in_progress());
    assert_eq!(h.decoder(0).lock().unwrap().fed.len(), 300);

    let sink = h.sink.lock().unwrap();
    assert_eq!(sink.written.len(), 300);
    assert_eq!(sink.drains, 1);
}
