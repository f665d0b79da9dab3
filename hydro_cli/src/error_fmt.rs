//! Human-readable error descriptions and structured JSON error formatting.

use hydro_core::error::{BuildError, CalibrationError, ControlError};
use hydro_hardware::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::NoLiveReading => {
                "What happened: A point was captured before any probe voltage was read.\nLikely causes: Probe disconnected or the capture ran before the first reading.\nHow to fix: Wait for a live voltage, then capture again.".to_string()
            }
            CalibrationError::InsufficientPoints => {
                "What happened: Not enough calibration points were captured.\nLikely causes: The points file is shorter than the selected mode.\nHow to fix: Capture one point per reference solution (or lower --mode) and rerun.".to_string()
            }
            CalibrationError::DivisionByZero => {
                "What happened: The single calibration point was read at 0 V.\nLikely causes: Probe unplugged, or the reading was taken in air.\nHow to fix: Check the probe connection and recapture in the reference solution.".to_string()
            }
            CalibrationError::DegenerateRegression => {
                "What happened: Every calibration point has the same voltage.\nLikely causes: The probe was not moved between reference solutions, or its reading is stuck.\nHow to fix: Rinse the probe, let it settle in each solution, and recapture.".to_string()
            }
            CalibrationError::InvalidPointIndex(i) => format!(
                "What happened: Point index {i} does not fit the calibration mode.\nLikely causes: Index 0, or an index above the number of required points.\nHow to fix: Number points from 1 up to the mode (1, 2 or 3)."
            ),
            CalibrationError::InvalidMode(m) => format!(
                "What happened: Calibration mode {m} is not supported.\nLikely causes: Typo in --mode or [calibration_modes].\nHow to fix: Use 1, 2 or 3 points."
            ),
            CalibrationError::NonFiniteInput | CalibrationError::NonFiniteResult => format!(
                "What happened: {ce}.\nLikely causes: NaN or infinite values in the points or temperature.\nHow to fix: Check the captured values and rerun."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::NoChannels => {
                "What happened: No dosing channels are configured.\nLikely causes: Every [[channels]] entry was removed.\nHow to fix: Add at least one [[channels]] table to the config.".to_string()
            }
            BuildError::DuplicateChannel(name) => format!(
                "What happened: Dosing channel '{name}' is defined twice.\nLikely causes: Copy-pasted [[channels]] entry.\nHow to fix: Give each channel a unique name."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ControlError::UnknownChannel(name)) = err.downcast_ref::<ControlError>() {
        return format!(
            "What happened: No dosing channel named '{name}'.\nLikely causes: Typo, or the channel is missing from the config.\nHow to fix: Use one of the names listed by `hydro self-check`."
        );
    }

    if let Some(he) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: Hardware error ({he}).\nLikely causes: Wrong pin numbers or insufficient GPIO permissions.\nHow to fix: Check [hardware] relay_pins and that the process may access GPIO."
        );
    }

    // String-based heuristics for errors coming from config or input files
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'point_index,reference_value,voltage'.".to_string();
    }

    if lower.contains("no calibration") {
        return format!(
            "What happened: {msg}.\nLikely causes: The probe was never calibrated, or the wrong calibration file was given.\nHow to fix: Run `hydro calibrate --sensor <probe> --save <file>` first."
        );
    }

    if lower.contains("parse config") || lower.contains("invalid config") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Syntax error or out-of-range values.\nHow to fix: Edit the TOML config and try again. Detail: {}",
            err.root_cause()
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 calibration, 4 controller build, 5 hardware, 1 otherwise.
/// (clap reports usage errors with 2.)
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<CalibrationError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<HwError>().is_some() {
        return 5;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::NoLiveReading => "NoLiveReading",
            CalibrationError::InsufficientPoints => "InsufficientPoints",
            CalibrationError::DivisionByZero => "DivisionByZero",
            CalibrationError::DegenerateRegression => "DegenerateRegression",
            CalibrationError::InvalidPointIndex(_) => "InvalidPointIndex",
            CalibrationError::InvalidMode(_) => "InvalidMode",
            CalibrationError::NonFiniteInput => "NonFiniteInput",
            CalibrationError::NonFiniteResult => "NonFiniteResult",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    if err.downcast_ref::<HwError>().is_some() {
        return "Hardware";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let obj = match err.downcast_ref::<CalibrationError>() {
        Some(CalibrationError::InvalidPointIndex(i)) => json!({
            "reason": reason_name(err),
            "details": { "point_index": i },
            "message": humanize(err),
        }),
        Some(CalibrationError::InvalidMode(m)) => json!({
            "reason": reason_name(err),
            "details": { "mode": m },
            "message": humanize(err),
        }),
        _ => json!({ "reason": reason_name(err), "message": humanize(err) }),
    };
    obj.to_string()
}
