//! CLI command tests

use std::fs;
use std::path::{Path, PathBuf};

use tally_core::test_utils::FixtureArtifacts;
use tally_core::{Config, EmbeddingBackendKind, ExportFormat, HeaderLocator};

use crate::commands;

const DIMS: usize = 256;

const STATEMENT_CSV: &str = "Date,Unique Id,Tran Type,Payee,Memo,Amount
01/02/24,1,EFTPOS,COUNTDOWN SUPERMARKET,,-84.20
01/02/24,2,D/C,LANDLORD,RENT FEB,\"-1,000.00\"
02/02/24,3,EFTPOS,Z ENERGY FUEL,,-71.05
";

const LEDGER_CSV: &str = "Date,Amount,Payee,Category
01/02/24,-1000.00,Landlord,Rent
";

/// Config reading header-first statements with the local hashing embedder
fn test_config(artifacts: Option<&FixtureArtifacts>) -> Config {
    let mut config = Config::embedded().unwrap();
    config.statement.header = HeaderLocator::Fixed(0);
    config.embedding.backend = EmbeddingBackendKind::Hashing;
    config.embedding.model = "hashing".to_string();
    config.embedding.dimensions = Some(DIMS);
    if let Some(artifacts) = artifacts {
        config.classifier.model_path = artifacts.model_path.clone();
        config.classifier.categories_path = artifacts.categories_path.clone();
    }
    config
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ========== Path Resolution Tests ==========

#[test]
fn test_resolve_input_in_search_order() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write_file(second.path(), "ledger.csv", LEDGER_CSV);

    let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
    let resolved = commands::resolve_input_in(Path::new("ledger.csv"), &dirs).unwrap();
    assert_eq!(resolved, second.path().join("ledger.csv"));

    // The first directory wins once it has the file too
    write_file(first.path(), "ledger.csv", LEDGER_CSV);
    let resolved = commands::resolve_input_in(Path::new("ledger.csv"), &dirs).unwrap();
    assert_eq!(resolved, first.path().join("ledger.csv"));
}

#[test]
fn test_resolve_input_in_not_found_lists_tried_paths() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];

    let err = commands::resolve_input_in(Path::new("missing.csv"), &dirs).unwrap_err();
    match &err {
        tally_core::Error::FileNotFound { path, tried } => {
            assert_eq!(path, Path::new("missing.csv"));
            assert_eq!(
                tried,
                &vec![
                    first.path().join("missing.csv"),
                    second.path().join("missing.csv")
                ]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("missing.csv"));
}

#[test]
fn test_resolve_input_in_absolute_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "statement.csv", STATEMENT_CSV);

    let resolved = commands::resolve_input_in(&path, &[]).unwrap();
    assert_eq!(resolved, path);

    let missing = dir.path().join("nope.csv");
    assert!(commands::resolve_input_in(&missing, &[]).is_err());
}

#[test]
fn test_prepare_output_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("reports").join("2024").join("out.csv");

    let resolved = commands::prepare_output(&output).unwrap();
    assert_eq!(resolved, output);
    assert!(dir.path().join("reports").join("2024").is_dir());
}

#[test]
fn test_parse_list() {
    assert_eq!(
        commands::parse_list(" key-a, ,key-b,"),
        vec!["key-a".to_string(), "key-b".to_string()]
    );
    assert!(commands::parse_list("").is_empty());
}

// ========== Label Command Tests ==========

#[test]
fn test_cmd_label() {
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);
    let ledger = write_file(dir.path(), "ledger.csv", LEDGER_CSV);
    let output = dir.path().join("out").join("labelled.csv");

    commands::cmd_label(&test_config(None), "ASB", &statement, &ledger, &output).unwrap();

    let labelled = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = labelled.lines().collect();
    assert_eq!(lines[0], "Date,Unique Id,Tran Type,Payee,Memo,Amount,Category");
    assert_eq!(lines[1], "01/02/24,1,EFTPOS,COUNTDOWN SUPERMARKET,,-84.20,");
    assert_eq!(lines[2], "01/02/24,2,D/C,LANDLORD,RENT FEB,\"-1,000.00\",Rent");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_cmd_label_unsupported_bank() {
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);
    let ledger = write_file(dir.path(), "ledger.csv", LEDGER_CSV);

    let err = commands::cmd_label(
        &test_config(None),
        "KIWIBANK",
        &statement,
        &ledger,
        &dir.path().join("out.csv"),
    )
    .unwrap_err();
    assert!(err.to_string().contains("KIWIBANK"));
    assert!(!dir.path().join("out.csv").exists());
}

#[test]
fn test_cmd_label_ledger_without_category_column() {
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);
    let ledger = write_file(
        dir.path(),
        "ledger.csv",
        "Date,Amount,Payee\n01/02/24,-1000.00,Landlord\n",
    );

    let result = commands::cmd_label(
        &test_config(None),
        "ASB",
        &statement,
        &ledger,
        &dir.path().join("out.csv"),
    );
    assert!(result.is_err());
}

// ========== Categorize Command Tests ==========

#[tokio::test]
async fn test_categorize_file_json() {
    let artifacts = FixtureArtifacts::write(DIMS);
    let config = test_config(Some(&artifacts));
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);

    let rendered = commands::categorize_file(&config, &statement, None, ExportFormat::Json)
        .await
        .unwrap();

    let rows: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["Predicted Category"], "Groceries");
    assert_eq!(rows[2]["Predicted Category"], "Fuel");
}

#[tokio::test]
async fn test_categorize_file_with_ledger_csv() {
    let artifacts = FixtureArtifacts::write(DIMS);
    let config = test_config(Some(&artifacts));
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);
    let ledger = write_file(dir.path(), "ledger.csv", LEDGER_CSV);

    let rendered =
        commands::categorize_file(&config, &statement, Some(&ledger), ExportFormat::Csv)
            .await
            .unwrap();

    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "sep=,");
    // Ledger match keeps its category and has no probability
    assert!(lines[3].contains(r#""LANDLORD","Rent","01/02/24","9:00 AM","-1,000.00","NZD","""#));
    assert_eq!(lines.len(), 5);
}

#[tokio::test]
async fn test_categorize_file_missing_columns_before_models() {
    // No artifacts on disk: validation must fail before models are loaded
    let config = test_config(None);
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(
        dir.path(),
        "statement.csv",
        "Date,Tran Type,Memo,Amount\n01/02/24,EFTPOS,,-1.00\n",
    );

    let err = commands::categorize_file(&config, &statement, None, ExportFormat::Json)
        .await
        .unwrap_err();
    let core = err.downcast_ref::<tally_core::Error>().unwrap();
    assert!(matches!(core, tally_core::Error::MissingColumns { row: 0, .. }));
}

#[tokio::test]
async fn test_categorize_file_missing_artifacts() {
    let mut config = test_config(None);
    config.classifier.model_path = PathBuf::from("/nonexistent/model.json");
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);

    let result = commands::categorize_file(&config, &statement, None, ExportFormat::Json).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_categorize_writes_output() {
    let artifacts = FixtureArtifacts::write(DIMS);
    let config = test_config(Some(&artifacts));
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);
    let output = dir.path().join("exports").join("moneywiz.csv");

    commands::cmd_categorize(&config, &statement, None, "csv", Some(&output))
        .await
        .unwrap();

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.starts_with("sep=,\n"));
}

#[tokio::test]
async fn test_cmd_categorize_rejects_unknown_format() {
    let config = test_config(None);
    let dir = tempfile::tempdir().unwrap();
    let statement = write_file(dir.path(), "statement.csv", STATEMENT_CSV);

    let result = commands::cmd_categorize(&config, &statement, None, "xlsx", None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_check() {
    let artifacts = FixtureArtifacts::write(DIMS);
    let config = test_config(Some(&artifacts));
    commands::cmd_check(&config).await.unwrap();
}
