use wxfeat::{
    fetch_staging, init_logging, log_app_start, log_output_written, logging_config_from_env,
    pipeline_config_from_env, write_staging_outputs, ReqwestBlockingFetcher,
};

const BINARY: &str = "fetch_staging";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(BINARY, &logging);

    let cfg = pipeline_config_from_env()?;
    let fetcher = ReqwestBlockingFetcher::new(cfg.source.http_timeout_ms)?;
    let staging = fetch_staging(&cfg, &fetcher)?;

    let (raw, staged) = write_staging_outputs(&cfg, &staging.table)?;
    for (label, path) in [("raw", &raw), ("staging", &staged)] {
        log_output_written(
            BINARY,
            label,
            &path.display().to_string(),
            staging.table.len(),
        );
    }

    Ok(())
}
