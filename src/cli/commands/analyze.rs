//! Analyze command - one-shot analysis of a single image

use crate::analysis::{CliAnalyzer, FileKind, FileNode, ImageAnalysis, LayerDetail};
use crate::cache::{JobCoordinator, Resolution};
use crate::cli::args::AnalyzeArgs;
use crate::config::Config;
use crate::error::{StrataError, StrataResult};
use crate::ui::{self, format_bytes, TaskSpinner, UiContext};
use crate::views::{parse_image_name, ImageViews};
use std::sync::Arc;

/// Widest command shown in the layer table
const COMMAND_WIDTH: usize = 72;

/// Execute the analyze command
pub async fn execute(args: AnalyzeArgs, config: &Config) -> StrataResult<()> {
    ui::init_theme();
    let ctx = UiContext::detect();
    let image = parse_image_name(&args.image)?.to_string();

    let mut analyzer_config = config.analyzer.clone();
    if let Some(engine) = args.engine {
        analyzer_config.engine = engine;
    }

    let coordinator = JobCoordinator::new(
        Arc::new(CliAnalyzer::new(&analyzer_config)),
        &config.cache,
    );
    let views = ImageViews::new(coordinator.clone());

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Analyzing {}", image));
    views.summary(&image)?;

    let analysis = match coordinator.wait(&image).await {
        Some(Resolution::Ready(analysis)) => analysis,
        Some(Resolution::Failed(error)) => {
            spinner.stop_error(&format!("Analysis of {} failed", image));
            return Err(StrataError::analysis_failed(&image, error));
        }
        _ => {
            spinner.stop_error(&format!("Analysis of {} did not finish", image));
            return Err(StrataError::Internal(format!(
                "analysis of {} did not finish",
                image
            )));
        }
    };
    spinner.stop(&format!(
        "Analyzed {} ({} layers)",
        image, analysis.layer_count
    ));

    match (args.layer, args.json) {
        (Some(index), true) => {
            let detail = views.layer(&image, index)?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        (Some(index), false) => print_layer(&ctx, &views.layer(&image, index)?),
        (None, true) => println!("{}", serde_json::to_string_pretty(analysis.as_ref())?),
        (None, false) => print_report(&ctx, &analysis),
    }

    Ok(())
}

fn print_report(ctx: &UiContext, analysis: &ImageAnalysis) {
    ui::intro(ctx, &analysis.name);
    ui::key_value(ctx, "Id", &analysis.id);
    if let (Some(os), Some(arch)) = (&analysis.os, &analysis.architecture) {
        ui::key_value(ctx, "Platform", &format!("{}/{}", os, arch));
    }
    ui::key_value(ctx, "Size", &format_bytes(analysis.size));
    ui::key_value(ctx, "Efficiency", &format!("{:.2}%", analysis.efficiency * 100.0));
    ui::key_value(ctx, "Wasted", &format_bytes(analysis.wasted_bytes));
    if analysis.wasted_bytes > 0 {
        ui::step_warn_hint(
            ctx,
            &format!("{} wasted across layers", format_bytes(analysis.wasted_bytes)),
            "Remove temporary files in the same step that creates them",
        );
    } else {
        ui::step_ok_detail(ctx, "No wasted space", &format!("{} layers", analysis.layer_count));
    }

    ui::section(ctx, "Layers");
    let widths = [5, 10];
    ui::row(
        ctx,
        &["INDEX".to_string(), "SIZE".to_string(), "COMMAND".to_string()],
        &widths,
    );
    for layer in &analysis.layers {
        ui::row(
            ctx,
            &[
                layer.index.to_string(),
                format_bytes(layer.size),
                truncate(&layer.command, COMMAND_WIDTH),
            ],
            &widths,
        );
    }

    if !analysis.inefficiencies.is_empty() {
        ui::section(ctx, "Wasted space");
        let widths = [6, 10];
        ui::row(ctx, &["COUNT".to_string(), "WASTED".to_string(), "PATH".to_string()], &widths);
        for item in &analysis.inefficiencies {
            ui::row(
                ctx,
                &[
                    item.count.to_string(),
                    format_bytes(item.wasted_bytes),
                    format!("/{}", item.path),
                ],
                &widths,
            );
        }
    }

    ui::outro_success(ctx, "Done");
}

fn print_layer(ctx: &UiContext, detail: &LayerDetail) {
    ui::intro(ctx, &format!("Layer {}", detail.index));
    ui::key_value(ctx, "Digest", &detail.digest);
    ui::key_value(ctx, "Command", &detail.command);
    ui::key_value(ctx, "Size", &format_bytes(detail.size));
    ui::key_value(ctx, "Entries", &detail.file_count.to_string());
    ui::section(ctx, "Files");

    let mut lines = Vec::new();
    tree_lines(&detail.tree, 0, &mut lines);
    for line in lines {
        println!("{}", line);
    }
    if detail.file_count == 0 {
        ui::remark(ctx, "This layer only changes metadata");
    }
}

fn tree_lines(node: &FileNode, depth: usize, out: &mut Vec<String>) {
    for child in &node.children {
        let marker = match child.kind {
            FileKind::Dir => "/",
            FileKind::Symlink => "@",
            FileKind::Removed => " (removed)",
            _ => "",
        };
        let target = child
            .link_target
            .as_deref()
            .map(|t| format!(" -> {}", t))
            .unwrap_or_default();
        out.push(format!(
            "{:>10}  {}{}{}{}",
            format_bytes(child.size),
            "  ".repeat(depth),
            child.name,
            marker,
            target
        ));
        tree_lines(child, depth + 1, out);
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{build_tree, FileRecord};

    #[test]
    fn truncate_long_commands() {
        assert_eq!(truncate("RUN make", 72), "RUN make");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn tree_lines_are_indented() {
        let tree = build_tree(&[
            FileRecord {
                path: "etc/alternatives/vi".into(),
                size: 0,
                mode: 0o777,
                kind: FileKind::Symlink,
                link_target: Some("/usr/bin/vim".into()),
            },
            FileRecord {
                path: "tmp/build".into(),
                size: 0,
                mode: 0,
                kind: FileKind::Removed,
                link_target: None,
            },
        ]);

        let mut lines = Vec::new();
        tree_lines(&tree, 0, &mut lines);

        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("etc/"));
        assert!(lines[1].ends_with("  alternatives/"));
        assert!(lines[2].ends_with("    vi@ -> /usr/bin/vim"));
        assert!(lines[4].ends_with("  build (removed)"));
    }
}
