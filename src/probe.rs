use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
    time::Duration,
};

use log::debug;
use serde::Deserialize;
use serde_json::Value;
use wait_timeout::ChildExt;

use crate::error::FrameplotError;

/// Wall-clock budget for one ffprobe run.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(30);

/// One decoded video frame as reported by ffprobe, in packet order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub pict_type: String,
    pub pkt_size: u64,
    pub pkt_duration_time: f64,
}

/// The handful of per-frame fields we care about. ffprobe emits the numeric
/// ones as JSON strings, so conversion happens in a second step.
#[derive(Debug, Deserialize)]
struct RawFrame {
    pict_type: Option<String>,
    pkt_size: Option<String>,
    pkt_duration_time: Option<String>,
}

pub fn probe(filename: &str) -> Result<Vec<FrameRecord>, FrameplotError> {
    let mut cmd = Command::new("ffprobe");
    cmd.arg("-v").arg("quiet");
    cmd.arg("-show_frames");
    cmd.arg("-select_streams").arg("v");
    cmd.arg("-print_format").arg("json");
    cmd.arg(filename);

    let output = run_with_deadline(cmd, PROBE_DEADLINE)?;
    parse_frames(&output)
}

/// Run a command to completion with a hard deadline, returning its combined
/// stdout and stderr. A child still running at the deadline is killed, not
/// waited out.
fn run_with_deadline(mut cmd: Command, deadline: Duration) -> Result<Vec<u8>, FrameplotError> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    // Drain both pipes off-thread: a frame dump easily overflows the pipe
    // buffer, and a blocked child would never reach the exit we wait on.
    let stdout_pump = spawn_pump(child.stdout.take());
    let stderr_pump = spawn_pump(child.stderr.take());

    match child.wait_timeout(deadline)? {
        Some(status) => {
            debug!("ffprobe exited with {}", status);
        }
        None => {
            kill_and_reap(&mut child);
            return Err(FrameplotError::ProbeTimeout(deadline));
        }
    }

    // With -v quiet the child keeps stderr empty; appending it after stdout
    // means any stray diagnostics corrupt the JSON parse instead of vanishing.
    let mut output = stdout_pump.join().unwrap_or_default();
    output.extend(stderr_pump.join().unwrap_or_default());
    Ok(output)
}

fn spawn_pump<R>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf);
        }
        buf
    })
}

fn kill_and_reap(child: &mut Child) {
    // The child may exit between the deadline and the kill; either way the
    // follow-up wait reaps it.
    let _ = child.kill();
    let _ = child.wait();
}

/// Parse the captured ffprobe output into frame records, failing on the
/// first malformed entry. No partial results.
fn parse_frames(raw: &[u8]) -> Result<Vec<FrameRecord>, FrameplotError> {
    let mut doc: Value = serde_json::from_slice(raw).map_err(FrameplotError::ProbeOutput)?;

    let frames = match doc.get_mut("frames").map(Value::take) {
        Some(Value::Array(entries)) => entries,
        _ => return Err(FrameplotError::NoFrames),
    };

    frames
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let raw: RawFrame =
                serde_json::from_value(entry).map_err(|e| FrameplotError::FrameField {
                    index,
                    field: "entry",
                    reason: format!("is not a frame object: {}", e),
                })?;
            frame_record(index, raw)
        })
        .collect()
}

fn frame_record(index: usize, raw: RawFrame) -> Result<FrameRecord, FrameplotError> {
    let missing = |field| FrameplotError::FrameField {
        index,
        field,
        reason: "is missing".into(),
    };

    let pict_type = raw.pict_type.ok_or_else(|| missing("pict_type"))?;
    let pkt_size = raw
        .pkt_size
        .ok_or_else(|| missing("pkt_size"))?
        .parse::<u64>()
        .map_err(|e| FrameplotError::FrameField {
            index,
            field: "pkt_size",
            reason: format!("is not an integer: {}", e),
        })?;
    let pkt_duration_time = raw
        .pkt_duration_time
        .ok_or_else(|| missing("pkt_duration_time"))?
        .parse::<f64>()
        .map_err(|e| FrameplotError::FrameField {
            index,
            field: "pkt_duration_time",
            reason: format!("is not a number: {}", e),
        })?;

    Ok(FrameRecord {
        pict_type,
        pkt_size,
        pkt_duration_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "frames": [
            {"media_type": "video", "pict_type": "I", "pkt_size": "4000", "pkt_duration_time": "0.040000"},
            {"media_type": "video", "pict_type": "P", "pkt_size": "1000", "pkt_duration_time": "0.040000"},
            {"media_type": "video", "pict_type": "B", "pkt_size": "500", "pkt_duration_time": "0.040000"}
        ]
    }"#;

    #[test]
    fn parses_frames_in_order() {
        let frames = parse_frames(SAMPLE.as_bytes()).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].pict_type, "I");
        assert_eq!(frames[0].pkt_size, 4000);
        assert_eq!(frames[0].pkt_duration_time, 0.04);
        assert_eq!(frames[1].pict_type, "P");
        assert_eq!(frames[2].pict_type, "B");
    }

    #[test]
    fn rejects_non_json_output() {
        let err = parse_frames(b"ffprobe: error while loading").unwrap_err();
        assert!(matches!(err, FrameplotError::ProbeOutput(_)));
    }

    #[test]
    fn rejects_output_without_frames_list() {
        let err = parse_frames(br#"{"packets": []}"#).unwrap_err();
        assert!(matches!(err, FrameplotError::NoFrames));

        let err = parse_frames(br#"{"frames": "nope"}"#).unwrap_err();
        assert!(matches!(err, FrameplotError::NoFrames));
    }

    #[test]
    fn rejects_frame_missing_a_field() {
        let err = parse_frames(
            br#"{"frames": [{"pict_type": "I", "pkt_duration_time": "0.04"}]}"#,
        )
        .unwrap_err();
        match err {
            FrameplotError::FrameField { index, field, .. } => {
                assert_eq!(index, 0);
                assert_eq!(field, "pkt_size");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn rejects_non_numeric_packet_size() {
        let err = parse_frames(
            br#"{"frames": [
                {"pict_type": "I", "pkt_size": "4000", "pkt_duration_time": "0.04"},
                {"pict_type": "P", "pkt_size": "huge", "pkt_duration_time": "0.04"}
            ]}"#,
        )
        .unwrap_err();
        match err {
            FrameplotError::FrameField { index, field, .. } => {
                assert_eq!(index, 1);
                assert_eq!(field, "pkt_size");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn collects_output_from_a_well_behaved_process() {
        let mut cmd = Command::new("echo");
        cmd.arg(r#"{"frames": []}"#);
        let output = run_with_deadline(cmd, Duration::from_secs(5)).unwrap();
        let frames = parse_frames(&output).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn kills_a_process_that_overruns_the_deadline() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let err = run_with_deadline(cmd, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, FrameplotError::ProbeTimeout(_)));
    }
}
