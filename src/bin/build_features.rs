use tracing::info;
use wxfeat::{
    build_inference_features, build_training_features, init_logging, log_app_start,
    log_output_written, logging_config_from_env, pipeline_config_from_env, read_staging_csv,
    validate_table, write_feature_csv,
};

const BINARY: &str = "build_features";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(BINARY, &logging);

    let cfg = pipeline_config_from_env()?;
    let staging = read_staging_csv(&cfg.paths.staging_csv())?;
    validate_table(&staging)?;

    let training = build_training_features(&cfg, &staging)?;
    let training_path = cfg.paths.training_csv();
    write_feature_csv(&training_path, &training.frame)?;
    log_output_written(
        BINARY,
        "training",
        &training_path.display().to_string(),
        training.frame.len(),
    );

    let inference = build_inference_features(&cfg)?;
    let inference_path = cfg.paths.inference_csv(&cfg.evaluation_range);
    write_feature_csv(&inference_path, &inference.frame)?;
    log_output_written(
        BINARY,
        "inference",
        &inference_path.display().to_string(),
        inference.frame.len(),
    );

    info!(
        component = BINARY,
        event = "app.schema",
        training_fingerprint = %training.schema.fingerprint,
        inference_fingerprint = %inference.schema.fingerprint
    );

    Ok(())
}
