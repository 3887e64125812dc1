/// Integration tests for the filter-bench CLI.
///
/// These run the binary end to end and check:
/// 1. Render writes a WAV of the requested length and format
/// 2. Renders are deterministic
/// 3. Every topology renders a finite signal
/// 4. The Newton solver passes its convergence check
/// 5. Invalid settings are rejected with a non-zero exit
/// 6. The matrix feedback curve is selectable
use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "filter-bench", "--"]);
    cmd
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(name)
}

#[test]
fn test_cli_renders_wav() {
    let output_path = temp_path("zdf_integration_render.wav");
    let _ = std::fs::remove_file(&output_path);

    let status = cargo_bin()
        .args(["render", "-d", "0.5", "--cutoff", "800", "-o"])
        .arg(&output_path)
        .status()
        .expect("failed to run filter-bench");

    assert!(status.success(), "filter-bench render exited with error");
    assert!(output_path.exists(), "WAV file not created");

    let reader = hound::WavReader::open(&output_path).expect("invalid WAV file");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 44100);
    assert_eq!(reader.spec().bits_per_sample, 24);
    assert_eq!(reader.len(), 22050);

    std::fs::remove_file(&output_path).ok();
}

#[test]
fn test_render_follows_sample_rate() {
    let output_path = temp_path("zdf_integration_48k.wav");
    let _ = std::fs::remove_file(&output_path);

    let status = cargo_bin()
        .args(["render", "-d", "0.25", "--sample-rate", "48000", "-o"])
        .arg(&output_path)
        .status()
        .unwrap();
    assert!(status.success());

    let reader = hound::WavReader::open(&output_path).unwrap();
    assert_eq!(reader.spec().sample_rate, 48000);
    assert_eq!(reader.len(), 12000);

    std::fs::remove_file(&output_path).ok();
}

#[test]
fn test_every_topology_renders() {
    for topology in ["closed-form", "matrix", "newton"] {
        let path = temp_path(&format!("zdf_integration_{topology}.wav"));
        let _ = std::fs::remove_file(&path);

        let status = cargo_bin()
            .args([
                "render",
                "-d",
                "0.3",
                "--resonance",
                "0.9",
                "--drive",
                "1.5",
                "--topology",
                topology,
                "-o",
            ])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success(), "{topology}: render failed");

        let peak = wav_peak(&path);
        assert!(peak > 1e-3, "{topology}: render is silent (peak {peak})");

        std::fs::remove_file(&path).ok();
    }
}

#[test]
fn test_stereo_input_round_trip() {
    let input = temp_path("zdf_integration_stereo_in.wav");
    let output = temp_path("zdf_integration_stereo_out.wav");
    let _ = std::fs::remove_file(&output);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&input, spec).unwrap();
    for i in 0..8820 {
        let t = i as f64 / 44100.0;
        let left = (0.4 * (2.0 * std::f64::consts::PI * 220.0 * t).sin() * 8_388_607.0) as i32;
        writer.write_sample(left).unwrap();
        writer.write_sample(0i32).unwrap();
    }
    writer.finalize().unwrap();

    let status = cargo_bin()
        .args(["render", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    let mut reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().channels, 2);
    let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 8820 * 2);
    let right_silent = samples.iter().skip(1).step_by(2).all(|&s| s == 0);
    let left_active = samples.iter().step_by(2).any(|&s| s != 0);
    assert!(left_active, "left channel lost its signal");
    assert!(right_silent, "silent right channel picked up signal");

    std::fs::remove_file(&input).ok();
    std::fs::remove_file(&output).ok();
}

#[test]
fn test_deterministic_output() {
    let path1 = temp_path("zdf_det_1.wav");
    let path2 = temp_path("zdf_det_2.wav");

    for path in [&path1, &path2] {
        let _ = std::fs::remove_file(path);
        let status = cargo_bin()
            .args(["render", "-d", "0.3", "--topology", "newton", "--resonance", "0.4", "-o"])
            .arg(path)
            .status()
            .unwrap();
        assert!(status.success());
    }

    let samples1 = read_wav_samples(&path1);
    let samples2 = read_wav_samples(&path2);
    assert_eq!(
        samples1, samples2,
        "two renders with the same settings should be identical"
    );

    std::fs::remove_file(&path1).ok();
    std::fs::remove_file(&path2).ok();
}

#[test]
fn test_morph_renders() {
    let path = temp_path("zdf_integration_morph.wav");
    let _ = std::fs::remove_file(&path);

    let status = cargo_bin()
        .args(["morph", "-d", "0.5", "-o"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.len(), 22050);
    assert!(wav_peak(&path) > 1e-3);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_converge_passes() {
    let status = cargo_bin()
        .args(["converge", "--diode", "0.8", "--amplitude", "1.0", "--duration", "0.2"])
        .status()
        .unwrap();
    assert!(status.success(), "Newton solver failed its residual check");
}

#[test]
fn test_impulse_writes_csv() {
    let path = temp_path("zdf_integration_impulse.csv");
    let _ = std::fs::remove_file(&path);

    let status = cargo_bin()
        .args(["impulse", "--samples", "512", "--csv"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    let csv = std::fs::read_to_string(&path).unwrap();
    assert_eq!(csv.lines().count(), 513, "header plus one line per sample");
    assert!(csv.starts_with("sample,value"));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_rejects_cutoff_above_nyquist() {
    let path = temp_path("zdf_integration_reject.wav");
    let output = cargo_bin()
        .args(["render", "-d", "0.1", "--cutoff", "30000", "-o"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success(), "cutoff above Nyquist should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("invalid filter settings"),
        "expected a settings error, got: {stderr}"
    );
}

fn wav_peak(path: &std::path::Path) -> f64 {
    let mut reader = hound::WavReader::open(path).expect("failed to open WAV");
    let max_val = (1i32 << (reader.spec().bits_per_sample - 1)) as f64;
    reader
        .samples::<i32>()
        .map(|s| (s.unwrap() as f64 / max_val).abs())
        .fold(0.0f64, f64::max)
}

fn read_wav_samples(path: &std::path::Path) -> Vec<i32> {
    let mut reader = hound::WavReader::open(path).expect("failed to open WAV");
    reader.samples::<i32>().map(|s| s.unwrap()).collect()
}

#[test]
fn test_matrix_curve_changes_render() {
    let render = |curve: &str| {
        let path = temp_path(&format!("zdf_integration_curve_{curve}.wav"));
        let _ = std::fs::remove_file(&path);
        let output = cargo_bin()
            .args([
                "render", "-d", "0.2", "--topology", "matrix", "--curve", curve,
                "--resonance", "1.0", "--cutoff", "110", "-o",
            ])
            .arg(&path)
            .output()
            .unwrap();
        assert!(output.status.success(), "render with --curve {curve} failed");
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let samples = read_wav_samples(&path);
        std::fs::remove_file(&path).ok();
        (stdout, samples)
    };

    let (linear_out, linear) = render("linear");
    let (log_out, log) = render("log");
    assert!(linear_out.contains("Curve:     Linear"), "got: {linear_out}");
    assert!(log_out.contains("Curve:     Logarithmic"), "got: {log_out}");
    assert_eq!(linear.len(), log.len());
    assert_ne!(linear, log, "feedback curve had no effect on the render");
}
