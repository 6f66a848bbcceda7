use wxfeat::{
    assert_schema_compatible, build_climatology_evaluation, build_oracle_evaluation,
    init_logging, log_app_start, log_output_written, logging_config_from_env, normalize,
    pipeline_config_from_env, read_staging_csv, training_columns, validate_table,
    write_feature_csv, FeatureSchema,
};

const BINARY: &str = "build_evaluation";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(BINARY, &logging);

    let cfg = pipeline_config_from_env()?;
    let history = read_staging_csv(&cfg.paths.staging_csv())?;
    validate_table(&history)?;
    let truth = read_staging_csv(&cfg.paths.test_set_csv(&cfg.evaluation_range))?;
    validate_table(&truth)?;

    let expected = FeatureSchema::for_columns(&training_columns(&cfg.history));

    let (climatology, _report) = build_climatology_evaluation(&cfg, &history, &truth)?;
    assert_schema_compatible(expected.version, &expected.fingerprint, &climatology.schema)?;
    let climatology_path = cfg.paths.climatology_evaluation_csv(&cfg.evaluation_range);
    write_feature_csv(&climatology_path, &climatology.frame)?;
    log_output_written(
        BINARY,
        "climatology",
        &climatology_path.display().to_string(),
        climatology.frame.len(),
    );

    // Oracle rows read the evaluated hours themselves.
    let combined = normalize(vec![history, truth])?;
    let oracle = build_oracle_evaluation(&cfg, &combined.table)?;
    assert_schema_compatible(expected.version, &expected.fingerprint, &oracle.schema)?;
    let oracle_path = cfg.paths.oracle_evaluation_csv(&cfg.evaluation_range);
    write_feature_csv(&oracle_path, &oracle.frame)?;
    log_output_written(
        BINARY,
        "oracle",
        &oracle_path.display().to_string(),
        oracle.frame.len(),
    );

    Ok(())
}
