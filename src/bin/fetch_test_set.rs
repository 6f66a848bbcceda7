use wxfeat::{
    fetch_test_set, init_logging, log_app_start, log_output_written, logging_config_from_env,
    pipeline_config_from_env, write_staging_csv, ReqwestBlockingFetcher,
};

const BINARY: &str = "fetch_test_set";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(BINARY, &logging);

    let cfg = pipeline_config_from_env()?;
    let fetcher = ReqwestBlockingFetcher::new(cfg.source.http_timeout_ms)?;
    let test_set = fetch_test_set(&cfg, &fetcher)?;

    let path = cfg.paths.test_set_csv(&cfg.evaluation_range);
    write_staging_csv(&path, &test_set.table)?;
    log_output_written(
        BINARY,
        "test_set",
        &path.display().to_string(),
        test_set.table.len(),
    );

    Ok(())
}
