// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: detect walls, the exterior perimeter and room boxes in a
//! floor plan image and print them as JSON
//!
//! Usage:
//!   floorplan-detect <image_path> [options]

use ifc_lite_floorplan::{
    geometry::PolygonMetrics, Detector, LabelBox, PipelineConfig, RoomBox, RoomBoxMethod,
    TextAnchor,
};
use serde::Serialize;
use std::env;
use std::fs;
use std::process;

#[derive(Serialize)]
struct LabelRoom {
    label: LabelBox,
    room: Option<RoomBox>,
    method: Option<RoomBoxMethod>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let image_path = &args[1];

    // Parse options
    let mut config_path: Option<String> = None;
    let mut ocr_path: Option<String> = None;
    let mut labels: Vec<LabelBox> = Vec::new();
    let mut with_corners = false;
    let mut pretty = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(option_value(&args, i, "--config").to_string());
            }
            "--ocr" => {
                i += 1;
                ocr_path = Some(option_value(&args, i, "--ocr").to_string());
            }
            "--label" => {
                i += 1;
                let value = option_value(&args, i, "--label");
                match parse_label(value) {
                    Some(label) => labels.push(label),
                    None => fail(&format!("Invalid label '{}', expected x,y,w,h", value)),
                }
            }
            "--corners" => {
                with_corners = true;
            }
            "--pretty" => {
                pretty = true;
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .unwrap_or_else(|e| fail(&format!("Cannot read config '{}': {}", path, e)));
            PipelineConfig::from_json_str(&text)
                .unwrap_or_else(|e| fail(&format!("Invalid config '{}': {}", path, e)))
        }
        None => PipelineConfig::default(),
    };

    let ocr_lines: Vec<TextAnchor> = match &ocr_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .unwrap_or_else(|e| fail(&format!("Cannot read OCR lines '{}': {}", path, e)));
            serde_json::from_str(&text)
                .unwrap_or_else(|e| fail(&format!("Invalid OCR lines '{}': {}", path, e)))
        }
        None => Vec::new(),
    };

    let grayscale = image::open(image_path)
        .unwrap_or_else(|e| fail(&format!("Cannot open image '{}': {}", image_path, e)))
        .to_luma8();

    let detector = Detector::new(config).unwrap_or_else(|e| fail(&e.to_string()));
    let analysis = detector
        .analyze(&grayscale)
        .unwrap_or_else(|e| fail(&format!("Detection failed: {}", e)));

    let metrics = analysis
        .result
        .perimeter()
        .and_then(|p| PolygonMetrics::compute(p.vertices()));

    let label_rooms: Vec<LabelRoom> = labels
        .iter()
        .map(|label| {
            let found = detector.room_box(&analysis, label);
            LabelRoom {
                label: *label,
                room: found.map(|(room, _)| room),
                method: found.map(|(_, method)| method),
            }
        })
        .collect();

    let dimension_rooms = detector.rooms_for_labels(&analysis, &ocr_lines);

    let mut output = serde_json::json!({
        "image": image_path,
        "detection": analysis.result,
        "counts": analysis.result.counts(),
        "perimeter_metrics": metrics,
        "rooms": label_rooms,
        "dimension_rooms": dimension_rooms,
    });
    if with_corners {
        output["corners"] = serde_json::json!(detector.corners(&grayscale));
    }

    let text = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    match text {
        Ok(text) => println!("{}", text),
        Err(e) => fail(&format!("Cannot serialize output: {}", e)),
    }
}

fn option_value<'a>(args: &'a [String], i: usize, name: &str) -> &'a str {
    match args.get(i) {
        Some(value) => value,
        None => fail(&format!("Missing value for {}", name)),
    }
}

fn parse_label(value: &str) -> Option<LabelBox> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Some(LabelBox::new(*x, *y, *w, *h)),
        _ => None,
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn print_usage() {
    println!("floorplan-detect - Extract walls, perimeter and rooms from a floor plan image");
    println!();
    println!("USAGE:");
    println!("  floorplan-detect <image_path> [options]");
    println!();
    println!("OPTIONS:");
    println!("  --config <file>     Pipeline configuration (JSON, partial allowed)");
    println!("  --label <x,y,w,h>   Refine the room around a label box (repeatable)");
    println!("  --ocr <file>        OCR lines as JSON [{{\"text\", \"bbox\"}}]; dimension");
    println!("                      labels among them seed room refinement");
    println!("  --corners           Include Harris corners for snapping");
    println!("  --pretty            Pretty-print the JSON output");
    println!("  -h, --help          Show this help");
    println!();
    println!("Set RUST_LOG=debug for per-stage logs on stderr.");
}
