//! After Effects ExtendScript (`.jsx`) backend.
//!
//! The script is one undo group. It defines a few helpers, creates or
//! reuses the composition, then adds one layer per object followed by its
//! keyframes:
//!
//! ```text
//! var comp = abcComp("shot", 1920, 1080, 1, 48, 24, 1);
//! layer = abcCamera(comp, "camera1");
//! abcKey(layer, "Position", 1, [0.000000, 5.000000, 10.000000]);
//! abcLens(layer, "Focal Length", 1, 35.000000);
//! ```
//!
//! Keyframe times are `(frame - START_FRAME) / FRAME_RATE` seconds.

use std::fmt::Write as _;
use std::io::{self, Write};

use super::{ExportScene, ScriptBackend};
use crate::convert::{NodeKind, OutputObject, Value};

/// Decimals written for magnitudes of 1 and above.
const DECIMALS: usize = 6;

/// Upper bound on decimals for tiny magnitudes.
const MAX_DECIMALS: usize = 15;

const HELPERS: &str = r#"    function abcTime(frame) {
        return (frame - START_FRAME) / FRAME_RATE;
    }

    function abcComp(name, width, height, pixelAspect, durationFrames, frameRate, startFrame) {
        var duration = durationFrames / frameRate;
        for (var i = 1; i <= app.project.numItems; i++) {
            var item = app.project.item(i);
            if (item instanceof CompItem && item.name === name) {
                item.width = width;
                item.height = height;
                item.pixelAspect = pixelAspect;
                item.frameRate = frameRate;
                item.duration = duration;
                item.displayStartTime = startFrame / frameRate;
                return item;
            }
        }
        var comp = app.project.items.addComp(name, width, height, pixelAspect, duration, frameRate);
        comp.displayStartTime = startFrame / frameRate;
        return comp;
    }

    var lens = null;

    function abcCamera(comp, name) {
        var layer = comp.layers.addCamera(name, [comp.width / 2, comp.height / 2]);
        layer.autoOrient = AutoOrientType.NO_AUTO_ORIENT;
        lens = { horizontal: [], vertical: [] };
        return layer;
    }

    function abcNull(comp, name) {
        var layer = comp.layers.addNull();
        layer.name = name;
        layer.threeDLayer = true;
        return layer;
    }

    function abcKey(layer, property, frame, value) {
        layer.transform.property(property).setValueAtTime(abcTime(frame), value);
    }

    function abcApertureAt(keys, frame, fallback) {
        var value = fallback;
        for (var i = 0; i < keys.length && keys[i][0] <= frame; i++) {
            value = keys[i][1];
        }
        return value;
    }

    function abcLens(layer, channel, frame, value) {
        if (channel === "Horizontal Aperture") {
            lens.horizontal.push([frame, value]);
            return;
        }
        if (channel === "Vertical Aperture") {
            lens.vertical.push([frame, value]);
            return;
        }
        var aperture = abcApertureAt(lens.horizontal, frame, 36 / APERTURE_TO_MM) * APERTURE_TO_MM;
        var zoom = layer.containingComp.width * value / aperture;
        layer.property("Camera Options").property("Zoom").setValueAtTime(abcTime(frame), zoom);
    }
"#;

/// ExtendScript backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsxBackend;

impl ScriptBackend for JsxBackend {
    fn name(&self) -> &str {
        "jsx"
    }

    fn extension(&self) -> &str {
        "jsx"
    }

    fn write_header(&self, scene: &ExportScene, out: &mut dyn Write) -> io::Result<()> {
        let grid = &scene.grid;
        writeln!(out, "// Generated by {} from {}", comment_safe(&scene.generator), comment_safe(&scene.source_name))?;
        writeln!(
            out,
            "// {} frames at {} fps starting at frame {}",
            grid.frame_count(),
            grid.frame_rate,
            grid.start_frame
        )?;
        writeln!(out, "// Positions and rotations are in the archive's Y-up space and are not flipped for After Effects")?;
        writeln!(out, "(function () {{")?;
        writeln!(out, "    app.beginUndoGroup({});", js_string("Import Alembic"))?;
        writeln!(out)?;
        writeln!(out, "    var APERTURE_TO_MM = {};", scene.aperture_to_mm)?;
        writeln!(out, "    var START_FRAME = {};", grid.start_frame)?;
        writeln!(out, "    var FRAME_RATE = {};", grid.frame_rate)?;
        writeln!(out)?;
        out.write_all(HELPERS.as_bytes())?;
        writeln!(out)?;
        writeln!(
            out,
            "    var comp = abcComp({}, {}, {}, {}, {}, {}, {});",
            js_string(&scene.composition_name),
            scene.width,
            scene.height,
            scene.pixel_aspect,
            grid.frame_count(),
            grid.frame_rate,
            grid.start_frame
        )?;
        writeln!(out, "    var layer;")
    }

    fn write_object(&self, _scene: &ExportScene, object: &OutputObject, out: &mut dyn Write) -> io::Result<()> {
        let create = match object.kind {
            NodeKind::Camera => "abcCamera",
            _ => "abcNull",
        };
        writeln!(out)?;
        writeln!(out, "    layer = {}(comp, {});", create, js_string(&object.target_name))?;

        for property in &object.properties {
            let helper = if property.channel.is_lens() { "abcLens" } else { "abcKey" };
            let name = js_string(property.channel.name());
            for key in &property.keyframes {
                writeln!(
                    out,
                    "    {}(layer, {}, {}, {});",
                    helper,
                    name,
                    key.frame,
                    format_value(&key.value)
                )?;
            }
        }
        Ok(())
    }

    fn write_footer(&self, _scene: &ExportScene, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "    app.endUndoGroup();")?;
        writeln!(out, "}})();")
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Scalar(v) => format_number(*v),
        Value::Vector(v) => format!("[{}, {}, {}]", format_number(v.x), format_number(v.y), format_number(v.z)),
    }
}

/// Fixed-precision number literal.
///
/// Six decimals, plus one more per leading zero below 1 so that at least
/// six significant digits remain. Zero, values that round to zero and
/// non-finite values are written as `0`.
pub fn format_number(v: f64) -> String {
    if !v.is_finite() || v == 0.0 {
        return "0".to_string();
    }
    let magnitude = v.abs();
    let decimals = if magnitude < 1.0 {
        ((-magnitude.log10()).floor() as usize + DECIMALS).min(MAX_DECIMALS)
    } else {
        DECIMALS
    };
    let s = format!("{:.*}", decimals, v);
    if s.bytes().all(|b| matches!(b, b'-' | b'0' | b'.')) {
        "0".to_string()
    } else {
        s
    }
}

/// Double-quoted JavaScript string literal.
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' | '\u{2029}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Text that cannot end a `//` comment.
fn comment_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() || c == '\u{2028}' || c == '\u{2029}' { ' ' } else { c })
        .collect()
}
