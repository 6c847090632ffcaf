//! Terminal commands and text rendering

use anyhow::{anyhow, bail, Result};
use bandtake_core::waveform::WaveformView;

/// Widest waveform the terminal view draws
pub const MAX_TERMINAL_COLUMNS: usize = 120;

/// Rows above and below the centre line
const HALF_ROWS: usize = 4;

pub const HELP: &str = "\
Commands:
  p            play / pause
  r            reset to start
  c            toggle click mute
  i            toggle count-in
  s <seconds>  seek
  v <n> <vol>  set volume of stem n (0-100)
  m <n>        toggle mute of stem n
  o <n> <sec>  set offset of stem n's take
  t [n]        preview stem n's take with the click (t alone: full mix)
  g            show waveform
  l            list stems
  h            help
  q            quit";

/// A parsed console command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    TogglePlay,
    Reset,
    ToggleClick,
    ToggleCountIn,
    Seek(f64),
    SetVolume { stem: usize, volume: u32 },
    ToggleMute(usize),
    SetOffset { stem: usize, seconds: f64 },
    /// Audition one take, or go back to the full mix with `None`
    Preview(Option<usize>),
    Waveform,
    ListStems,
    Help,
    Quit,
}

/// Parse one input line (stem numbers are 1-based on screen, 0-based here)
pub fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        bail!("Empty command (h for help)");
    };

    let command = match head {
        "p" => Command::TogglePlay,
        "r" => Command::Reset,
        "c" => Command::ToggleClick,
        "i" => Command::ToggleCountIn,
        "g" => Command::Waveform,
        "l" => Command::ListStems,
        "h" | "?" => Command::Help,
        "q" => Command::Quit,
        "s" => {
            let seconds = next_arg(&mut words, "seek position")?
                .parse::<f64>()
                .map_err(|e| anyhow!("Invalid seek position: {}", e))?;
            Command::Seek(seconds)
        }
        "v" => {
            let stem = stem_index(next_arg(&mut words, "stem number")?)?;
            let volume = next_arg(&mut words, "volume")?
                .parse::<u32>()
                .map_err(|e| anyhow!("Invalid volume: {}", e))?;
            Command::SetVolume { stem, volume }
        }
        "m" => Command::ToggleMute(stem_index(next_arg(&mut words, "stem number")?)?),
        "o" => {
            let stem = stem_index(next_arg(&mut words, "stem number")?)?;
            let seconds = next_arg(&mut words, "offset")?
                .parse::<f64>()
                .map_err(|e| anyhow!("Invalid offset: {}", e))?;
            if !seconds.is_finite() {
                bail!("Offset must be a finite number of seconds");
            }
            Command::SetOffset { stem, seconds }
        }
        "t" => Command::Preview(words.next().map(stem_index).transpose()?),
        other => bail!("Unknown command {:?} (h for help)", other),
    };

    if words.next().is_some() {
        bail!("Too many arguments for {:?}", head);
    }
    Ok(command)
}

fn next_arg<'a>(words: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    words.next().ok_or_else(|| anyhow!("Missing {}", what))
}

fn stem_index(word: &str) -> Result<usize> {
    match word.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => bail!("Invalid stem number {:?} (stems are numbered from 1)", word),
    }
}

/// Draw peaks as text, with a ruler marking bar lines (`|`) and the playhead (`^`)
pub fn render_waveform(view: &WaveformView, indicator_x: Option<usize>) -> Vec<String> {
    let columns = view.peaks.len();
    let scale = view
        .peaks
        .iter()
        .fold(0.0f32, |peak, (min, max)| peak.max(min.abs()).max(max.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let rows = HALF_ROWS * 2;
    let mut lines: Vec<String> = (0..rows)
        .map(|row| {
            // amplitude at the centre of this row, top = +1
            let level = 1.0 - (2 * row + 1) as f32 / rows as f32;
            view.peaks
                .iter()
                .map(|(min, max)| {
                    let (lo, hi) = (min / scale, max / scale);
                    let step = 1.0 / rows as f32;
                    if lo <= level + step && hi >= level - step {
                        '#'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect();

    let mut ruler = vec![' '; columns];
    if columns > 0 {
        for line in &view.gridlines {
            ruler[line.x.min(columns - 1)] = '|';
        }
        if let Some(x) = indicator_x {
            ruler[x.min(columns - 1)] = '^';
        }
    }
    lines.push(ruler.into_iter().collect());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandtake_core::music::TempoMeter;
    use bandtake_core::SampleBuffer;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("p").unwrap(), Command::TogglePlay);
        assert_eq!(parse_command("  q  ").unwrap(), Command::Quit);
        assert_eq!(parse_command("s 12.5").unwrap(), Command::Seek(12.5));
        assert_eq!(parse_command("v 2 75").unwrap(), Command::SetVolume { stem: 1, volume: 75 });
        assert_eq!(parse_command("m 1").unwrap(), Command::ToggleMute(0));
        assert_eq!(
            parse_command("o 3 -0.25").unwrap(),
            Command::SetOffset { stem: 2, seconds: -0.25 }
        );
        assert_eq!(parse_command("t 2").unwrap(), Command::Preview(Some(1)));
        assert_eq!(parse_command("t").unwrap(), Command::Preview(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("x").is_err());
        assert!(parse_command("s").is_err());
        assert!(parse_command("s soon").is_err());
        assert!(parse_command("m 0").is_err());
        assert!(parse_command("p now").is_err());
        assert!(parse_command("o 1").is_err());
        assert!(parse_command("o 1 NaN").is_err());
        assert!(parse_command("t 0").is_err());
        assert!(parse_command("t 1 2").is_err());
    }

    #[test]
    fn test_render_waveform() {
        let frames = 5000;
        let samples = (0..frames).map(|i| if i < 2500 { 0.8 } else { 0.0 }).collect();
        let buffer = SampleBuffer::from_channels(vec![samples], 1000).unwrap();
        let tempo = TempoMeter::new(120.0, 4, 4).unwrap();
        let view = WaveformView::new(&buffer, Some(&tempo), 50);

        let lines = render_waveform(&view, Some(10));
        assert_eq!(lines.len(), HALF_ROWS * 2 + 1);
        assert!(lines.iter().all(|l| l.chars().count() == 50));

        // loud first half touches the top row, silent second half does not
        let top: Vec<char> = lines[0].chars().collect();
        assert_eq!(top[0], '#');
        assert_eq!(top[49], ' ');

        let ruler: Vec<char> = lines[HALF_ROWS * 2].chars().collect();
        assert_eq!(ruler[0], '|');
        assert_eq!(ruler[20], '|');
        assert_eq!(ruler[40], '|');
        assert_eq!(ruler[10], '^');
    }
}
