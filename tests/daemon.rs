//! Integration tests for the seqroute daemon.
//!
//! Exercises config, the JSON rule file and status reporting on top of the
//! in-memory sequencer.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use seqroute::prelude::*;
use seqroute::{JsonRuleStore, PortCaps, RuleStore};

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ---------------------------------------------------------------------------
// 1. Rules survive a restart
// ---------------------------------------------------------------------------

/// A manual connection is written to the rule file and realized again by the
/// next daemon, even though the devices come back at different addresses.
#[test]
fn test_rule_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connections.json");

    {
        let seq = Arc::new(MemorySequencer::new(128));
        let a = seq.add_client_port(20, "Keystation", "MIDI 1", PortCaps::DUPLEX_SUBS);
        let b = seq.add_client_port(24, "FluidSynth", "Synth input", PortCaps::DUPLEX_SUBS);

        let daemon = SeqRouteDaemon::builder()
            .rules_path(Some(path.clone()))
            .build(seq.clone())
            .unwrap();

        seq.connect_external(a, b).unwrap();
        assert!(eventually(|| !daemon.router().rules().unwrap().is_empty()));
        daemon.shutdown();
    }

    let on_disk = JsonRuleStore::open(&path).unwrap().list().unwrap();
    assert_eq!(
        on_disk,
        vec![ConnectionRule::new(
            "Keystation",
            "MIDI 1",
            "FluidSynth",
            "Synth input"
        )]
    );

    // Next boot: different numbering, the rule is realized at startup
    let seq = Arc::new(MemorySequencer::new(129));
    let a = seq.add_client_port(28, "Keystation", "MIDI 1", PortCaps::DUPLEX_SUBS);
    let b = seq.add_client_port(130, "FluidSynth", "Synth input", PortCaps::DUPLEX_SUBS);

    let daemon = SeqRouteDaemon::builder()
        .rules_path(Some(path))
        .build(seq.clone())
        .unwrap();

    assert!(seq.has_edge(a, b));
    assert_eq!(daemon.router().startup_report().unwrap().connected, 1);
}

// ---------------------------------------------------------------------------
// 2. Status report
// ---------------------------------------------------------------------------

#[test]
fn test_status_json_shape() {
    let seq = Arc::new(MemorySequencer::new(128));
    let a = seq.add_client_port(20, "Keys", "Out", PortCaps::DUPLEX_SUBS);
    let b = seq.add_client_port(21, "Synth", "In", PortCaps::WRITE | PortCaps::SUBS_WRITE);

    let daemon = SeqRouteDaemon::builder()
        .rules_path(None)
        .client_name("studio")
        .build(seq.clone())
        .unwrap();
    daemon.router().connect(a, b).unwrap();
    assert!(eventually(|| daemon.router().rules().unwrap().len() == 1));

    let status = daemon.status().unwrap();
    let json = serde_json::to_value(&status).unwrap();

    assert_eq!(json["devices"]["20"]["name"], "Keys");
    assert_eq!(json["devices"]["20"]["ports"]["0"]["is_input"], true);
    assert_eq!(json["devices"]["21"]["ports"]["0"]["is_input"], false);
    assert_eq!(json["devices"]["21"]["ports"]["0"]["is_output"], true);
    assert_eq!(
        json["outputtoinput"]["20"]["0"][0],
        serde_json::json!({"device_id": 21, "port_id": 0})
    );
    assert_eq!(json["connections"][0]["from_device"], "Keys");
    assert_eq!(json["config"]["client_name"], "studio");
    assert_eq!(json["config"]["client_id"], 128);
    assert!(json["config"]["hostname"].is_string());
    assert_eq!(json["partial"], false);
}

#[test]
fn test_status_after_shutdown_fails() {
    let daemon = SeqRouteDaemon::builder()
        .rules_path(None)
        .build(Arc::new(MemorySequencer::new(128)))
        .unwrap();
    daemon.shutdown();

    assert!(matches!(
        daemon.status(),
        Err(Error::Core(seqroute::core::Error::NotInitialized))
    ));
}

// ---------------------------------------------------------------------------
// 3. Config file
// ---------------------------------------------------------------------------

#[test]
fn test_config_file_drives_builder() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("seqroute.json");
    let rules_path = dir.path().join("rules").join("connections.json");
    std::fs::write(
        &config_path,
        serde_json::json!({
            "client_name": "rack",
            "rules_path": rules_path,
            "queue_capacity": 4,
            "startup_reconcile": false
        })
        .to_string(),
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.queue_capacity, 4);
    assert_eq!(config.log_level, "info");

    let daemon = SeqRouteDaemon::builder()
        .config(config)
        .build(Arc::new(MemorySequencer::new(128)))
        .unwrap();
    assert_eq!(daemon.router().client_name(), "rack");
    assert!(daemon.router().startup_report().is_none());
}

#[test]
fn test_config_load_errors() {
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        Config::load(dir.path().join("missing.json")),
        Err(Error::Config(_))
    ));

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    assert!(matches!(Config::load(&bad), Err(Error::Json(_))));

    let zero = dir.path().join("zero.json");
    std::fs::write(&zero, r#"{"queue_capacity": 0}"#).unwrap();
    assert!(Config::load(&zero).is_err());
}
