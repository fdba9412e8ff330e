use demprep::{Error, PipelineConfig};
use std::env;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        println!("Usage: <region_id> [target_total_pixels]");
        return Err(Error::Configuration(
            "Missing commandline argument".to_string(),
        ));
    }

    let region_id = &args[1];
    let mut config = PipelineConfig::default();
    if let Some(pixels) = args.get(2) {
        config.target_total_pixels = pixels
            .parse()
            .map_err(|e| Error::Configuration(format!("bad pixel budget {:?}: {}", pixels, e)))?;
    }
    if let Ok(key) = env::var("OPENTOPOGRAPHY_API_KEY") {
        config
            .credentials
            .insert("opentopography".to_string(), key);
    }

    let result = demprep::prepare_region(region_id, config).await?;
    println!(
        "{}: {}x{} from {} ({}) -> {}",
        result.region_id,
        result.width,
        result.height,
        result.dataset,
        result.quality.as_str(),
        result.artifact_path.display()
    );
    Ok(())
}
