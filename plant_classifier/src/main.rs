use clap::{Parser, Subcommand, ValueEnum};
use plant_classifier::{
    catalog::split_label,
    config::{ModelConfig, TensorLayout},
    evaluation::evaluate_directory,
    Classifier, LabelCatalog, OrtModelService,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "plant_evaluate")]
#[command(about = "Offline checks for the plant-disease ONNX model")]
struct Cli {
    /// Path to the exported ONNX model
    #[arg(long, env = "PLANT_MODEL")]
    model: PathBuf,

    /// Labels file, one class per line. Defaults to the PlantVillage classes.
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long, default_value_t = 224)]
    input_size: u32,

    #[arg(long, value_enum, default_value_t = Layout::Nhwc)]
    layout: Layout,

    /// Multiplier applied to raw 0..255 pixel values
    #[arg(long, default_value_t = 1.0)]
    pixel_scale: f32,

    /// Apply softmax to the model output
    #[arg(long)]
    softmax: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score every image under <dir>/<label>/
    Evaluate {
        dir: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a single image and show the most likely classes
    Predict {
        image: PathBuf,
        #[arg(long, default_value_t = 3)]
        top: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Layout {
    Nhwc,
    Nchw,
}

impl From<Layout> for TensorLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Nhwc => TensorLayout::Nhwc,
            Layout::Nchw => TensorLayout::Nchw,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ort=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let model_dir = cli
        .model
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let onnx_file = cli
        .model
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or("model path has no file name")?;

    let model_config = ModelConfig {
        onnx_file,
        model_dir,
        num_instances: 1,
        input_size: cli.input_size,
        layout: cli.layout.into(),
        pixel_scale: cli.pixel_scale,
        output_name: None,
        apply_softmax: cli.softmax,
    };

    let catalog = match &cli.labels {
        Some(path) => LabelCatalog::from_file(path)?,
        None => LabelCatalog::plant_village(),
    };
    let catalog = Arc::new(catalog);

    let model = OrtModelService::new(&model_config)?;
    let classifier = Classifier::new(model, catalog.clone(), model_config.input_spec());

    match cli.command {
        Command::Evaluate { dir, json } => {
            let report = evaluate_directory(&classifier, &dir).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Command::Predict { image, top } => {
            let image_data = std::fs::read(&image)?;
            let prediction = classifier.classify(&image_data).await?;

            println!("Top {} predictions:", top);
            for ranked in prediction.top_k(&catalog, top) {
                println!("  {}: {:.2}%", ranked.label, ranked.probability * 100.0);
            }

            let (plant, condition) = split_label(&prediction.label);
            println!("Class:      {}", prediction.label);
            println!("Plant:      {}", plant);
            println!("Condition:  {}", condition);
            println!("Confidence: {:.2}%", prediction.confidence * 100.0);
        }
    }

    Ok(())
}
