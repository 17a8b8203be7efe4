use std::fs;
use std::process::{Command, Output};

fn ev_demand(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ev-demand"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("ev-demand process should run")
}

#[test]
fn demo_run_ingests_forecasts_and_exports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = dir.path().join("store");
    let export = dir.path().join("out");

    let output = ev_demand(&[
        "run",
        "--demo",
        "--days",
        "45",
        "--seed",
        "3",
        "--preset",
        "quick",
        "--store",
        store.to_str().unwrap(),
        "--export",
        export.to_str().unwrap(),
        "--as-of",
        "2024-03-01T00:00",
    ]);
    assert!(
        output.status.success(),
        "demo run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.contains("--- Ingest Report ---"));
    assert!(stdout.contains("--- Demand Grids ---"));
    assert!(stdout.contains("hourly validation"));

    assert!(store.join("hourlyparams.json").exists());
    let hourly = fs::read_to_string(export.join("hourlyforecasts.csv")).expect("hourly export");
    // header + 24 hours x 3 columns
    assert_eq!(hourly.lines().count(), 73);
    assert!(hourly.starts_with("timestamp,column,value,issuedAt"));
    for name in ["fiveminutedemand", "hourlydemand", "dailydemand", "monthlydemand"] {
        assert!(export.join(format!("{name}.csv")).exists(), "{name}.csv missing");
    }
}

#[test]
fn config_file_drives_a_csv_ingest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = dir.path().join("sessions.csv");
    fs::write(
        &records,
        "userId,stationId,choice,startChargeTime,lastUpdate,cumEnergyDelivered_Wh,durationHours\n\
         u1,s1,REGULAR,2024-01-01T00:00,2024-01-01T00:17,1000,0.283\n\
         u2,s1,REGULAR,2024-01-01T01:00,2024-01-01T01:00,0,0\n",
    )
    .expect("write records");

    let output = ev_demand(&[
        "ingest",
        "--config",
        "configs/small-site.toml",
        "--records",
        records.to_str().unwrap(),
        "--store",
        dir.path().join("store").to_str().unwrap(),
        "--as-of",
        "2024-01-01T01:00",
    ]);
    assert!(
        output.status.success(),
        "ingest failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.contains("Sessions accepted: 1"));
    assert!(stdout.contains("Dropped: 0 malformed, 1 degenerate, 0 expired"));
}

#[test]
fn forecast_before_ingest_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = ev_demand(&["forecast-daily", "--store", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dailydemand"), "stderr={stderr}");
}

#[test]
fn conflicting_arguments_are_usage_errors() {
    let output = ev_demand(&["run", "--demo", "--config", "a.toml", "--preset", "quick"]);
    assert_eq!(output.status.code(), Some(2));
    let output = ev_demand(&["ingest"]);
    assert_eq!(output.status.code(), Some(2));
}
