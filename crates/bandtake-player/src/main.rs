//! Bandtake Player - audition a song's takes against a click track
//!
//! ```text
//! bandtake-player <song.yaml>                 interactive playback
//! bandtake-player <song.yaml> --render out.wav render what would be heard
//! bandtake-player --list-devices              list audio outputs
//! ```
//!
//! Set RUST_LOG=debug for verbose output.

mod console;
mod manifest;
mod song;

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bandtake_core::audio::{list_output_devices, OfflineOutput, OutputContext, OutputDevice};
use bandtake_core::audio_file::write_wav;
use bandtake_core::config::{default_config_path, load_config, save_config, AppConfig};
use bandtake_core::engine::{MixResult, PlaybackPhase, PlaybackScheduler};
use bandtake_core::waveform::WaveformView;
use bandtake_core::SampleBuffer;
use crossbeam::channel::{unbounded, RecvTimeoutError};

use console::{parse_command, render_waveform, Command, HELP, MAX_TERMINAL_COLUMNS};
use song::Song;

/// UI refresh interval (~60 Hz)
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Frames rendered per step when rendering offline
const RENDER_BLOCK: usize = 1024;

const USAGE: &str = "Usage: bandtake-player <song.yaml> [--render <out.wav>] [--list-devices]";

/// What the scheduler currently plays
struct Loaded {
    mix: MixResult,
    /// Stem whose take is auditioned on its own instead of the full mix
    preview: Option<usize>,
}

impl Loaded {
    fn rebuild(&mut self, song: &Song) -> Result<()> {
        self.mix = match self.preview {
            Some(stem) => song.build_preview(stem)?,
            None => song.build()?,
        };
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    manifest: Option<PathBuf>,
    render: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list-devices" => parsed.list_devices = true,
            "--render" => {
                let out = args.next().context("--render needs an output path")?;
                parsed.render = Some(PathBuf::from(out));
            }
            flag if flag.starts_with("--") => bail!("Unknown flag {}\n{}", flag, USAGE),
            _ if parsed.manifest.is_some() => bail!("More than one song given\n{}", USAGE),
            _ => parsed.manifest = Some(PathBuf::from(arg)),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    if args.list_devices {
        for device in list_output_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    let manifest_path = args.manifest.context(USAGE)?;
    let config_path = default_config_path();
    let mut config: AppConfig = load_config(&config_path);

    let song = Song::open(&manifest_path, &config)?;

    match args.render {
        Some(out) => render_to_file(&song, &config, &out),
        None => {
            run_interactive(song, &mut config)?;
            save_config(&config, &config_path)
        }
    }
}

/// Play the song through the offline device and write what was heard
fn render_to_file(song: &Song, config: &AppConfig, out: &std::path::Path) -> Result<()> {
    let mut mix = song.build()?;
    if !config.playback.click_enabled {
        mix.click = None;
    }

    let output = OfflineOutput::with_block_size(song.sample_rate, RENDER_BLOCK).capturing();
    let mut scheduler = PlaybackScheduler::new(output);
    scheduler.set_count_in_enabled(config.playback.count_in_enabled);
    scheduler.load(mix);
    scheduler.play()?;

    while scheduler.phase() != PlaybackPhase::Ended {
        if !scheduler.status().is_animating() {
            bail!("Playback stopped unexpectedly in {:?}", scheduler.phase());
        }
        scheduler.device_mut().render_frames(RENDER_BLOCK);
        scheduler.tick()?;
    }

    let frames = scheduler.device_mut().take_captured();
    let buffer = SampleBuffer::from_stereo_frames(&frames, song.sample_rate)?;
    write_wav(out, &buffer)?;
    println!("Rendered {:?} ({:.2}s) to {:?}", song.title, buffer.duration_seconds(), out);
    Ok(())
}

fn run_interactive(mut song: Song, config: &mut AppConfig) -> Result<()> {
    let output = OutputContext::cpal(config.audio.clone().with_sample_rate(song.sample_rate));
    let mut scheduler = PlaybackScheduler::new(output);
    scheduler.set_click_muted(!config.playback.click_enabled);
    scheduler.set_count_in_enabled(config.playback.count_in_enabled);

    let mut loaded = Loaded {
        mix: song.build()?,
        preview: None,
    };
    scheduler.load(&loaded.mix);

    let (line_tx, line_rx) = unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    println!("{} ({} BPM, {})", song.title, song.tempo.bpm(), song.tempo.time_signature());
    print_stems(&song);
    println!("{}", HELP);

    let mut last_label = String::new();
    loop {
        match line_rx.recv_timeout(TICK_INTERVAL) {
            Ok(line) => match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    if let Err(e) = handle_command(command, &mut song, &mut loaded, &mut scheduler, config) {
                        eprintln!("{:#}", e);
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Err(e) = scheduler.tick() {
            log::error!("Playback error: {}", e);
        }

        let label = scheduler.status().label();
        if label != last_label {
            println!("{}", label);
            last_label = label;
        }
    }

    scheduler.reset();
    Ok(())
}

fn handle_command<D: OutputDevice>(
    command: Command,
    song: &mut Song,
    loaded: &mut Loaded,
    scheduler: &mut PlaybackScheduler<D>,
    config: &mut AppConfig,
) -> Result<()> {
    match command {
        Command::TogglePlay => {
            let result = scheduler.toggle();
            check_output_rate(scheduler.device().sample_rate(), song.sample_rate)?;
            result?;
        }
        Command::Reset => scheduler.reset(),
        Command::ToggleClick => {
            let muted = !scheduler.click_muted();
            scheduler.set_click_muted(muted);
            config.playback.click_enabled = !muted;
            println!("Click {}", if muted { "muted" } else { "on" });
        }
        Command::ToggleCountIn => {
            let enabled = !scheduler.count_in_enabled();
            scheduler.set_count_in_enabled(enabled);
            config.playback.count_in_enabled = enabled;
            println!("Count-in {}", if enabled { "on" } else { "off" });
        }
        Command::Seek(seconds) => scheduler.seek(seconds)?,
        Command::SetVolume { stem, volume } => {
            let volume = song.set_volume(stem, volume)?;
            println!("{}: volume {}", song.stems[stem].name, volume.units());
            loaded.rebuild(song)?;
            scheduler.load(&loaded.mix);
        }
        Command::ToggleMute(stem) => {
            let muted = song.toggle_mute(stem)?;
            println!("{}: {}", song.stems[stem].name, if muted { "muted" } else { "unmuted" });
            loaded.rebuild(song)?;
            scheduler.load(&loaded.mix);
        }
        Command::SetOffset { stem, seconds } => {
            let shift = song.set_offset(stem, seconds)?;
            if let Some(take) = song.stems[stem].take.as_ref() {
                println!("{}: offset {:+.3}s", song.stems[stem].name, take.offset_seconds);
            }
            loaded.rebuild(song)?;
            // only the previewed take's own timeline moves with its offset
            if loaded.preview == Some(stem) {
                scheduler.load_shifted(&loaded.mix, shift);
            } else {
                scheduler.load(&loaded.mix);
            }
        }
        Command::Preview(Some(stem)) => {
            loaded.mix = song.build_preview(stem)?;
            loaded.preview = Some(stem);
            scheduler.load(&loaded.mix);
            println!("Previewing {} with click (t for the full mix)", song.stems[stem].name);
        }
        Command::Preview(None) => {
            loaded.preview = None;
            loaded.rebuild(song)?;
            scheduler.load(&loaded.mix);
            println!("Playing the full mix");
        }
        Command::Waveform => {
            let width = config.waveform.width.clamp(1, MAX_TERMINAL_COLUMNS);
            let tempo = config.waveform.gridlines.then_some(&song.tempo);
            let view = WaveformView::new(&loaded.mix.stems, tempo, width);
            let status = scheduler.status();
            for line in render_waveform(&view, Some(status.indicator_x(width))) {
                println!("{}", line);
            }
        }
        Command::ListStems => print_stems(song),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

/// Takes are never resampled, so the output must run at the song's rate
fn check_output_rate(device_rate: u32, song_rate: u32) -> Result<()> {
    if device_rate != song_rate {
        bail!(
            "Audio output runs at {}Hz but the takes are {}Hz; pick a device that supports {}Hz",
            device_rate,
            song_rate,
            song_rate
        );
    }
    Ok(())
}

fn print_stems(song: &Song) {
    for (i, stem) in song.stems.iter().enumerate() {
        let state = match (&stem.take, stem.muted) {
            (None, _) => "no take".to_string(),
            (Some(_), true) => "muted".to_string(),
            (Some(take), false) => format!("vol {}, offset {:+.3}s", stem.volume.units(), take.offset_seconds),
        };
        println!("  {}. {} ({})", i + 1, stem.name, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["song.yaml", "--render", "out.wav"]).unwrap();
        assert_eq!(parsed.manifest, Some(PathBuf::from("song.yaml")));
        assert_eq!(parsed.render, Some(PathBuf::from("out.wav")));
        assert!(!parsed.list_devices);

        assert!(args(&["--list-devices"]).unwrap().list_devices);
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["song.yaml", "--render"]).is_err());
        assert!(args(&["--loud"]).is_err());
        assert!(args(&["a.yaml", "b.yaml"]).is_err());
    }

    fn two_second_song(dir: &std::path::Path) -> Song {
        let take = SampleBuffer::from_channels(vec![vec![0.5; 16000]], 8000).unwrap();
        write_wav(&dir.join("keys.wav"), &take).unwrap();
        let manifest = dir.join("song.yaml");
        std::fs::write(&manifest, "bpm: 120\nstems:\n  - instrument: keys\n    path: keys.wav\n").unwrap();
        Song::open(&manifest, &AppConfig::default()).unwrap()
    }

    #[test]
    fn test_offset_edit_while_previewing_moves_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut song = two_second_song(dir.path());
        let mut config = AppConfig::default();
        let mut loaded = Loaded {
            mix: song.build().unwrap(),
            preview: None,
        };
        let mut scheduler = PlaybackScheduler::new(OfflineOutput::new(song.sample_rate));
        scheduler.load(&loaded.mix);

        let mut run = |command, song: &mut Song, loaded: &mut Loaded, scheduler: &mut PlaybackScheduler<OfflineOutput>| {
            handle_command(command, song, loaded, scheduler, &mut config).unwrap()
        };

        run(Command::Preview(Some(0)), &mut song, &mut loaded, &mut scheduler);
        assert_eq!(loaded.preview, Some(0));
        assert!((scheduler.total_duration() - 2.0).abs() < 1e-9);
        scheduler.seek(1.0).unwrap();

        run(Command::SetOffset { stem: 0, seconds: 0.25 }, &mut song, &mut loaded, &mut scheduler);
        assert!((scheduler.total_duration() - 1.75).abs() < 1e-9);
        assert_eq!(scheduler.phase(), PlaybackPhase::Paused);
        assert!((scheduler.paused_at() - 0.75).abs() < 1e-9);

        // moving back past the playhead sends it to the start
        run(Command::SetOffset { stem: 0, seconds: 1.5 }, &mut song, &mut loaded, &mut scheduler);
        assert_eq!(scheduler.phase(), PlaybackPhase::Idle);
        assert_eq!(scheduler.paused_at(), 0.0);

        run(Command::Preview(None), &mut song, &mut loaded, &mut scheduler);
        assert_eq!(loaded.preview, None);
        assert!(loaded.mix.count_in.is_some());
    }

    #[test]
    fn test_play_reports_output_rate_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut song = two_second_song(dir.path());
        let mut config = AppConfig::default();
        let mut loaded = Loaded {
            mix: song.build().unwrap(),
            preview: None,
        };
        let mut scheduler = PlaybackScheduler::new(OfflineOutput::new(16000));
        scheduler.load(&loaded.mix);

        let err = handle_command(Command::TogglePlay, &mut song, &mut loaded, &mut scheduler, &mut config).unwrap_err();
        assert!(err.to_string().contains("16000Hz"), "{}", err);
        assert_eq!(scheduler.phase(), PlaybackPhase::Idle);
        assert!(scheduler.device().active_sources().is_empty());

        assert!(check_output_rate(8000, 8000).is_ok());
    }

    #[test]
    fn test_render_to_file_includes_count_in() {
        let dir = tempfile::tempdir().unwrap();
        let take = SampleBuffer::from_channels(vec![vec![0.5; 8000]], 8000).unwrap();
        write_wav(&dir.path().join("drums.wav"), &take).unwrap();
        let manifest = dir.path().join("song.yaml");
        std::fs::write(
            &manifest,
            "title: Render\nbpm: 120\nstems:\n  - instrument: drums\n    path: drums.wav\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.playback.count_in_enabled = true;
        let song = Song::open(&manifest, &config).unwrap();
        let out = dir.path().join("out.wav");
        render_to_file(&song, &config, &out).unwrap();

        let rendered = bandtake_core::audio_file::decode_file(&out).unwrap();
        assert_eq!(rendered.channel_count(), 2);
        // 2s count-in + 1s of stems, rounded up to whole render blocks
        let duration = rendered.duration_seconds();
        assert!(duration >= 3.0, "{}", duration);
        assert!(duration < 3.0 + RENDER_BLOCK as f64 / 8000.0 + 1e-9, "{}", duration);
        // stems start right after the count-in bar
        assert!((rendered.channel(0)[16500] - 0.5).abs() < 1e-6);
    }
}
