use std::path::Path;

use console::Style;
use tessera_core::pipeline::config::MontageConfig;
use tessera_core::pipeline::MontageOutput;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_montage_summary(
    manifest: &Path,
    output: &Path,
    num_tiles: usize,
    config: &MontageConfig,
) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Tessera Montage"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Manifest"),
        s.path.apply_to(manifest.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!("  {:<14}{}", s.label.apply_to("Tiles"), s.value.apply_to(num_tiles));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Threads"),
        s.value.apply_to(config.threads)
    );
    println!();

    // Feature alignment
    println!("  {}", s.header.apply_to("Alignment"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Model"),
        s.method.apply_to(format!(
            "{} -> {}",
            config.align.expected_model, config.align.desired_model
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Epsilon"),
        s.value.apply_to(format!("{} px", config.align.max_epsilon))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Iterations"),
        s.value.apply_to(config.optimize.max_iterations)
    );
    println!();

    // Block matching
    if let Some(ref bm) = config.block_match {
        println!("  {}", s.header.apply_to("Block Matching"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Scale"),
            s.value.apply_to(bm.layer_scale)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Search"),
            s.value.apply_to(format!("{} px", bm.search_radius))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Min r"),
            s.value.apply_to(bm.min_r)
        );
        if bm.use_local_smoothness_filter {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Smoothness"),
                s.method.apply_to(bm.local_model)
            );
        } else {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Smoothness"),
                s.disabled.apply_to("disabled")
            );
        }
        println!();
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Block Matching"),
            s.disabled.apply_to("disabled")
        );
        println!();
    }

    let elastic = if config.block_match.is_some() && config.elastic.enabled {
        s.method.apply_to(format!(
            "thin-plate spline, {} landmarks max",
            config.elastic.max_landmarks
        ))
    } else {
        s.disabled.apply_to("disabled".to_string())
    };
    println!("  {:<14}{}", s.header.apply_to("Elastic"), elastic);
    println!();
}

pub fn print_montage_result(output: &MontageOutput) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Connected"),
        s.value.apply_to(format!("{} pairs", output.connected_pairs))
    );
    if !output.failed_pairs.is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Failed"),
            s.disabled.apply_to(format!("{:?}", output.failed_pairs))
        );
    }
    for (i, summary) in output.summaries.iter().enumerate() {
        println!(
            "    {:<12}{}",
            s.label.apply_to(format!("Group {}", i + 1)),
            s.value.apply_to(format!(
                "{} tiles, {} iterations, error {:.2} / {:.2} / {:.2}",
                summary.tiles.len(),
                summary.iterations,
                summary.min_error,
                summary.mean_error,
                summary.max_error
            ))
        );
        if !summary.disconnected.is_empty() {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Dropped"),
                s.disabled.apply_to(format!("{:?}", summary.disconnected))
            );
        }
    }
    let kinds: Vec<&str> = output.transforms.iter().map(|t| t.class_name()).collect();
    let elastic = kinds
        .iter()
        .filter(|k| k.ends_with("ThinPlateSplineTransform"))
        .count();
    println!(
        "    {:<12}{}",
        s.label.apply_to("Elastic"),
        s.value.apply_to(format!("{elastic} of {} tiles", kinds.len()))
    );
}
