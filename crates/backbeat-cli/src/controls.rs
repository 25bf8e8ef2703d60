//! Line-based live controls for `backbeat play`

use backbeat_core::{InstrumentGroup, PatternRequest};
use backbeat_services::PlaybackCommand;

pub const HELP: &str = "\
commands:
  play | stop               start or stop the transport
  select <key>              switch to a library pattern (e.g. select p_7)
  random                    switch to a random library pattern
  var                       variation of the current pattern
  loop <beat>               repeat one beat (1-based) across the bar
  tempo <bpm>               20-300
  speed <rate> | faster | slower
  swing <percent>           0-50, multiples of 5
  preroll <beats>           0, 2 or 4
  metro on|off
  mute <group> | unmute <group>   kicks, snares, hihats, cymbals, toms
  status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Command(PlaybackCommand),
    Help,
    Quit,
}

fn arg<'a>(words: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str, String> {
    words.next().ok_or_else(|| format!("missing {what}"))
}

fn number<T: std::str::FromStr>(text: &str) -> Result<T, String> {
    text.parse().map_err(|_| format!("not a number: {text}"))
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Control>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => return Ok(Some(Control::Quit)),
        "help" | "?" => return Ok(Some(Control::Help)),
        "play" | "p" => PlaybackCommand::Play,
        "stop" | "s" => PlaybackCommand::Stop,
        "status" => PlaybackCommand::Status,
        "select" => PlaybackCommand::Request(PatternRequest::Select(arg(&mut words, "pattern key")?.to_string())),
        "random" => PlaybackCommand::Request(PatternRequest::Random),
        "var" | "variation" => PlaybackCommand::Request(PatternRequest::Variation),
        "loop" => {
            let beat: usize = number(arg(&mut words, "beat")?)?;
            if beat == 0 {
                return Err("beats are numbered from 1".into());
            }
            PlaybackCommand::Request(PatternRequest::BeatRepeat(beat - 1))
        }
        "tempo" | "bpm" => PlaybackCommand::SetTempo(number(arg(&mut words, "tempo")?)?),
        "speed" => PlaybackCommand::SetSpeedRate(number(arg(&mut words, "rate")?)?),
        "faster" => PlaybackCommand::Faster,
        "slower" => PlaybackCommand::Slower,
        "swing" => PlaybackCommand::SetSwing(number(arg(&mut words, "percent")?)?),
        "preroll" => PlaybackCommand::SetPreRoll(number(arg(&mut words, "beats")?)?),
        "metro" | "metronome" => match arg(&mut words, "on/off")? {
            "on" => PlaybackCommand::SetMetronome(true),
            "off" => PlaybackCommand::SetMetronome(false),
            other => return Err(format!("expected on or off, got {other}")),
        },
        "mute" | "unmute" => {
            let group: InstrumentGroup = arg(&mut words, "group")?
                .parse()
                .map_err(|e| format!("{e}"))?;
            PlaybackCommand::SetMuted(group, verb.eq_ignore_ascii_case("mute"))
        }
        other => return Err(format!("unknown command: {other} (try help)")),
    };
    Ok(Some(Control::Command(cmd)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> PlaybackCommand {
        match parse_line(line) {
            Ok(Some(Control::Command(c))) => c,
            other => panic!("{line}: {other:?}"),
        }
    }

    #[test]
    fn test_transport_and_requests() {
        assert_eq!(cmd("play"), PlaybackCommand::Play);
        assert_eq!(cmd("  STOP "), PlaybackCommand::Stop);
        assert_eq!(
            cmd("select p_12"),
            PlaybackCommand::Request(PatternRequest::Select("p_12".into()))
        );
        assert_eq!(cmd("var"), PlaybackCommand::Request(PatternRequest::Variation));
        assert_eq!(cmd("loop 2"), PlaybackCommand::Request(PatternRequest::BeatRepeat(1)));
        assert_eq!(parse_line("quit"), Ok(Some(Control::Quit)));
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn test_settings() {
        assert_eq!(cmd("tempo 96.5"), PlaybackCommand::SetTempo(96.5));
        assert_eq!(cmd("speed 0.75"), PlaybackCommand::SetSpeedRate(0.75));
        assert_eq!(cmd("swing 30"), PlaybackCommand::SetSwing(30));
        assert_eq!(cmd("metro on"), PlaybackCommand::SetMetronome(true));
        assert_eq!(cmd("mute HiHats"), PlaybackCommand::SetMuted(InstrumentGroup::HiHats, true));
        assert_eq!(cmd("unmute toms"), PlaybackCommand::SetMuted(InstrumentGroup::Toms, false));
    }

    #[test]
    fn test_bad_input() {
        assert!(parse_line("loop 0").is_err());
        assert!(parse_line("loop").is_err());
        assert!(parse_line("tempo fast").is_err());
        assert!(parse_line("mute bells").is_err());
        assert!(parse_line("metro maybe").is_err());
        assert!(parse_line("dance").is_err());
    }
}
