//! End-to-end lifecycle tests
//!
//! These run real `/bin/sh` commands inside temporary directories and verify
//! the lifecycle contract: ordering, sample repetition, working directory and
//! environment handling, per-cell output logs, multi-line commands, and the
//! CSV round-trip through the post-processor.

use benchalot::config::Config;
use benchalot::executor::{ExecutionOutcome, Executor};
use benchalot::output::{write_outputs, OutputFlags};
use benchalot::planner::build_plan;
use tempfile::TempDir;

fn run_config(text: &str) -> ExecutionOutcome {
    let config = Config::parse(text).unwrap();
    let plan = build_plan(&config, "2026-01-01--00-00-00").unwrap();
    Executor::new(&config).execute(&plan).unwrap()
}

fn lifecycle_config(dir: &TempDir, samples: u32) -> String {
    format!(
        "\
cwd: '{cwd}'
samples: {samples}
setup: [echo setup>>o]
prepare: [echo prepare>>o]
benchmark: [echo benchmark>>o]
conclude: [echo conclude>>o]
custom-metrics:
  - m: echo custom-metrics>>o && echo 0
cleanup: [echo cleanup>>o]
",
        cwd = dir.path().display(),
        samples = samples
    )
}

#[test]
fn test_lifecycle_order_single_sample() {
    let dir = TempDir::new().unwrap();
    let outcome = run_config(&lifecycle_config(&dir, 1));
    assert_eq!(outcome.failed_samples, 0);

    let observed = std::fs::read_to_string(dir.path().join("o")).unwrap();
    assert_eq!(
        observed,
        "setup\nprepare\nbenchmark\nconclude\ncustom-metrics\ncleanup\n"
    );
}

#[test]
fn test_lifecycle_order_repeats_measured_section() {
    let dir = TempDir::new().unwrap();
    run_config(&lifecycle_config(&dir, 3));

    let observed = std::fs::read_to_string(dir.path().join("o")).unwrap();
    let mut expected = String::from("setup\n");
    for _ in 0..3 {
        expected.push_str("prepare\nbenchmark\nconclude\ncustom-metrics\n");
    }
    expected.push_str("cleanup\n");
    assert_eq!(observed, expected);
}

#[test]
fn test_matrix_with_templated_cwd() {
    let dir = TempDir::new().unwrap();
    for sub in ["dir1", "dir2", "dir3"] {
        std::fs::create_dir(dir.path().join(sub)).unwrap();
    }
    let log = dir.path().join("o");
    let text = format!(
        "\
matrix:
  dir: [dir1, dir2, dir3]
cwd: '{base}/{{{{dir}}}}'
benchmark: [echo $PWD/benchmark >> {log}]
",
        base = dir.path().display(),
        log = log.display()
    );
    run_config(&text);

    let observed = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = observed.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, sub) in lines.iter().zip(["dir1", "dir2", "dir3"]) {
        assert!(
            line.contains(sub) && line.ends_with("/benchmark"),
            "unexpected line: {}",
            line
        );
        assert!(line.starts_with('/'), "expected an absolute path: {}", line);
    }
}

#[test]
fn test_matrix_with_templated_env() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("o");
    let sections = ["setup", "prepare", "benchmark", "conclude", "cleanup"];
    let commands: String = sections
        .iter()
        .map(|s| format!("{}: [echo {} $VAR >> {}]\n", s, s, log.display()))
        .collect();
    let text = format!(
        "\
matrix:
  var: [A, B, C]
env:
  VAR: '{{{{var}}}}'
custom-metrics:
  - m: echo custom-metrics $VAR >> {log} && echo 0
{commands}",
        log = log.display(),
        commands = commands
    );
    run_config(&text);

    let observed = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = observed.lines().collect();
    assert_eq!(lines.len(), 18);
    for (group, value) in ["A", "B", "C"].iter().enumerate() {
        for line in &lines[group * 6..(group + 1) * 6] {
            assert!(
                line.ends_with(&format!(" {}", value)),
                "group {} line '{}' should carry VAR={}",
                group,
                line,
                value
            );
        }
    }
}

#[test]
fn test_save_output_one_file_per_cell() {
    let dir = TempDir::new().unwrap();
    let text = format!(
        "\
matrix:
  var: [A, B, C]
benchmark: ['echo line-{{{{var}}}}']
save-output: '{}/output{{{{var}}}}'
",
        dir.path().display()
    );
    let outcome = run_config(&text);
    assert_eq!(outcome.log_files.len(), 3);

    for var in ["A", "B", "C"] {
        let content = std::fs::read_to_string(dir.path().join(format!("output{}", var))).unwrap();
        assert!(content.contains(&format!("line-{}", var)));
        for other in ["A", "B", "C"].iter().filter(|o| **o != var) {
            assert!(
                !content.contains(&format!("line-{}", other)),
                "output{} leaked cell {} lines",
                var,
                other
            );
        }
    }
}

#[test]
fn test_multi_line_command_preserved_in_order() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("o");
    let text = format!(
        "\
matrix:
  var: [A, B]
benchmark: |
  echo line1 {{{{var}}}} >> {log}
  echo line2 {{{{var}}}} >> {log}
",
        log = log.display()
    );
    run_config(&text);

    let observed = std::fs::read_to_string(&log).unwrap();
    assert_eq!(observed, "line1 A\nline2 A\nline1 B\nline2 B\n");
}

#[test]
fn test_sample_row_counts() {
    // 3 cells x 2 samples x (2 stages x 2 numeric metrics) + 2 custom rows
    let outcome = run_config(
        "\
matrix:
  v: [1, 2, 3]
samples: 2
metrics: [time, rss]
benchmark:
  build: ['true']
  run: ['true']
custom-metrics:
  - phases: printf 'a,b\\n1,2\\n'
",
    );
    assert_eq!(outcome.table.len(), 3 * 2 * (2 * 2 + 2));
}

#[test]
fn test_failed_cell_excluded_from_default_output_only() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("raw.csv");
    let md = dir.path().join("table.md");
    let text = format!(
        "\
matrix:
  v: [ok, bad]
samples: 2
benchmark: ['test {{{{v}}}} = ok']
results:
  raw:
    format: csv
    filename: '{csv}'
  table:
    format: md
    filename: '{md}'
",
        csv = csv.display(),
        md = md.display()
    );
    let config = Config::parse(&text).unwrap();
    let plan = build_plan(&config, "t").unwrap();
    let outcome = Executor::new(&config).execute(&plan).unwrap();
    assert_eq!(outcome.failed_samples, 2);

    write_outputs(&config, &outcome.table, OutputFlags::default(), "t").unwrap();
    let table_text = std::fs::read_to_string(&md).unwrap();
    assert!(table_text.contains("ok"));
    assert!(!table_text.contains("bad"), "got: {}", table_text);
    // The raw CSV always keeps every sample
    let raw = benchalot_report::read_results_file(&csv).unwrap();
    assert_eq!(raw.len(), 4);

    // --include-failed restores the rows in table outputs
    let flags = OutputFlags {
        include_failed: true,
        include_outliers: false,
    };
    write_outputs(&config, &outcome.table, flags, "t").unwrap();
    let table_text = std::fs::read_to_string(&md).unwrap();
    assert!(table_text.contains("bad"), "got: {}", table_text);
}

#[test]
fn test_csv_round_trip_reproduces_postprocessor_output() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    std::fs::create_dir_all(&first).unwrap();
    std::fs::create_dir_all(&second).unwrap();

    let config_for = |out: &std::path::Path| {
        format!(
            "\
matrix:
  v: [A, B]
samples: 4
benchmark: ['true']
custom-metrics:
  - answer: echo 42
results:
  raw:
    format: csv
    filename: '{out}/result.csv'
  table:
    format: md
    filename: '{out}/table.md'
    stats: [min, median, mean, std, max, relative]
",
            out = out.display()
        )
    };

    let config = Config::parse(&config_for(&first)).unwrap();
    let plan = build_plan(&config, "t").unwrap();
    let outcome = Executor::new(&config).execute(&plan).unwrap();
    write_outputs(&config, &outcome.table, OutputFlags::default(), "t").unwrap();

    // Reload the raw CSV and re-run the post-processor into a second tree
    let reloaded = benchalot_report::read_results_file(first.join("result.csv")).unwrap();
    let config2 = Config::parse(&config_for(&second)).unwrap();
    write_outputs(&config2, &reloaded, OutputFlags::default(), "t").unwrap();

    let table1 = std::fs::read_to_string(first.join("table.md")).unwrap();
    let table2 = std::fs::read_to_string(second.join("table.md")).unwrap();
    assert_eq!(table1, table2);

    let csv1 = std::fs::read_to_string(first.join("result.csv")).unwrap();
    let csv2 = std::fs::read_to_string(second.join("result.csv")).unwrap();
    assert_eq!(csv1, csv2);
}

#[test]
fn test_exclude_shrinks_and_include_grows_the_plan() {
    let base = "\
matrix:
  a: [1, 2]
  b: [x, y]
benchmark: ['echo {{a}}{{b}}']
";
    let count = |text: &str| {
        let config = Config::parse(text).unwrap();
        build_plan(&config, "t").unwrap().cells.len()
    };
    let full = count(base);
    assert_eq!(full, 4);
    assert_eq!(count(&format!("{}exclude:\n  - a: 1\n", base)), 2);
    assert_eq!(
        count(&format!("{}include:\n  - a: 9\n    b: z\n", base)),
        5
    );
}

#[test]
fn test_unknown_template_variable_fails_before_any_command() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran");
    let text = format!(
        "\
setup: ['touch {}']
benchmark: ['echo {{{{missing}}}}']
",
        marker.display()
    );
    let config = Config::parse(&text).unwrap();
    assert!(build_plan(&config, "t").is_err());
    assert!(!marker.exists(), "no command may run when planning fails");
}
