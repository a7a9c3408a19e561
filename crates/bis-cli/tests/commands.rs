//! Integration tests for the CLI commands and summaries.

use std::fs;
use std::path::Path;

use tempfile::tempdir;

use bis_cli::cli::{DocumentArgs, InspectArgs, ResaveArgs, StepsArgs};
use bis_cli::commands::{load_config, open_document, run_inspect, run_resave, run_steps};
use bis_cli::summary::{kind_label, ledger_table, source_label, step_rows, submodel_table};

const CASTLE: &str = "0 FILE castle.ldr
0 Castle
0 Name: castle.ldr
0 Author: T
0 !CATEGORY Building
1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat
0 STEP
1 16 0 0 0 1 0 0 0 1 0 0 0 1 tower.ldr
0 !LPUB BUILD_MOD BEGIN flag
1 1 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat
0 !LPUB BUILD_MOD END_MOD
0 !LPUB BUILD_MOD END
0 STEP
0 NOFILE
0 FILE tower.ldr
0 Tower
0 Name: tower.ldr
0 Author: T
0 !CATEGORY Building
1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat
0 STEP
1 4 0 24 0 1 0 0 0 1 0 0 0 1 3001.dat
0 NOFILE
";

fn write_project(dir: &Path) -> DocumentArgs {
    let file = dir.join("castle.mpd");
    fs::write(&file, CASTLE).unwrap();
    let library = dir.join("pieces.txt");
    fs::write(&library, "# known parts\n3001.dat\n").unwrap();
    DocumentArgs {
        file,
        library: Some(library),
        ..DocumentArgs::default()
    }
}

#[test]
fn test_inspect_counts_submodels() {
    let dir = tempdir().unwrap();
    let args = InspectArgs {
        document: write_project(dir.path()),
        build_mods: true,
    };
    let loaded = run_inspect(&args).unwrap();

    assert_eq!(loaded.summary.submodels, 2);
    assert_eq!(loaded.summary.steps, 4);
    assert_eq!(loaded.summary.build_mods, 1);
    assert_eq!(loaded.summary.missing, 0);
    assert!(!loaded.has_errors());

    let tower = loaded.document.submodel("tower.ldr").unwrap();
    assert_eq!(kind_label(tower), "model");
    assert_eq!(source_label(&tower.source), "document");

    let table = submodel_table(&loaded.document).to_string();
    assert!(table.contains("castle.ldr"));
    assert!(table.contains("tower.ldr"));
}

#[test]
fn test_steps_in_build_order() {
    let dir = tempdir().unwrap();
    let args = StepsArgs {
        document: write_project(dir.path()),
        model: None,
    };
    let loaded = run_steps(&args).unwrap();
    let listing: Vec<String> = step_rows(&loaded.document, None)
        .iter()
        .map(|row| {
            let mut line = format!("{} {} line {} [{}]", row.index, row.model, row.line, row.key);
            if !row.build_mods.is_empty() {
                line.push(' ');
                line.push_str(&row.build_mods.join(","));
            }
            line
        })
        .collect();

    insta::assert_snapshot!(listing.join("\n"), @r"
    0 castle.ldr line 1 [0;0;1]
    1 tower.ldr line 1 [1;0;1]
    2 tower.ldr line 7 [1;6;2]
    3 castle.ldr line 7 [0;6;2] flag APPLY
    ");
}

#[test]
fn test_steps_filtered_by_model() {
    let dir = tempdir().unwrap();
    let args = StepsArgs {
        document: write_project(dir.path()),
        model: Some("TOWER.LDR".to_string()),
    };
    let loaded = run_steps(&args).unwrap();
    let rows = step_rows(&loaded.document, args.model.as_deref());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.model == "tower.ldr"));
}

#[test]
fn test_steps_unknown_model_is_an_error() {
    let dir = tempdir().unwrap();
    let args = StepsArgs {
        document: write_project(dir.path()),
        model: Some("keep.ldr".to_string()),
    };
    let err = run_steps(&args).unwrap_err();
    assert!(err.to_string().contains("keep.ldr"));
}

#[test]
fn test_missing_parts_reach_the_ledger_table() {
    let dir = tempdir().unwrap();
    let mut args = write_project(dir.path());
    args.library = None;
    let loaded = open_document(&args, load_config(None).unwrap()).unwrap();

    assert_eq!(loaded.summary.missing, 1);
    let table = ledger_table(loaded.document.ledger()).to_string();
    assert!(table.contains("missing reference"));
    assert!(table.contains("3001.dat"));
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("bis.toml");
    fs::write(
        &config_path,
        "default_author = \"Castle Crew\"\nmax_include_depth = 2\n",
    )
    .unwrap();

    let config = load_config(Some(config_path.as_path())).unwrap();
    assert_eq!(config.default_author, "Castle Crew");
    assert_eq!(config.max_include_depth, 2);
    assert!(config.insert_missing_headers);

    fs::write(&config_path, "max_include_depth = \"deep\"\n").unwrap();
    let err = load_config(Some(config_path.as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("bis.toml"));
}

#[test]
fn test_resave_to_new_path() {
    let dir = tempdir().unwrap();
    let document = write_project(dir.path());
    let output = dir.path().join("copy.mpd");
    let args = ResaveArgs {
        document,
        output: Some(output.clone()),
    };
    let result = run_resave(&args).unwrap();

    assert_eq!(result.output, output);
    assert_eq!(fs::read_to_string(&output).unwrap(), CASTLE);
}

#[test]
fn test_open_missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let args = DocumentArgs {
        file: dir.path().join("absent.mpd"),
        ..DocumentArgs::default()
    };
    let err = open_document(&args, load_config(None).unwrap()).unwrap_err();
    assert!(err.to_string().contains("absent.mpd"));
}
