use anyhow::{Context, Result};
use clap::Args;
use tessera_core::transform::{CoordinateTransform, Transform};

#[derive(Args)]
pub struct TransformArgs {
    /// Transform class name, as found in the `class` attribute
    #[arg(long)]
    pub class: String,

    /// Transform data string, as found in the `data` attribute
    #[arg(long)]
    pub data: String,

    /// Point to transform, as `x,y` (repeatable)
    #[arg(short, long = "point", value_parser = parse_point)]
    pub points: Vec<[f64; 2]>,

    /// Print the transform as an XML element instead of its data string
    #[arg(long)]
    pub xml: bool,
}

pub fn run(args: &TransformArgs) -> Result<()> {
    let transform = Transform::from_class_and_data(&args.class, &args.data)
        .with_context(|| format!("Failed to parse {} data", args.class))?;

    if args.xml {
        println!("{}", transform.to_xml(""));
    } else {
        println!("{}", transform.to_data_string());
    }

    for &p in &args.points {
        let q = transform.apply(p);
        print!("({}, {}) -> ({}, {})", p[0], p[1], q[0], q[1]);
        if transform.is_invertible() {
            let back = transform.apply_inverse(q)?;
            print!("  inverse ({}, {})", back[0], back[1]);
        }
        println!();
    }

    Ok(())
}

fn parse_point(s: &str) -> std::result::Result<[f64; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in '{s}': {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in '{s}': {e}"))?;
    Ok([x, y])
}
