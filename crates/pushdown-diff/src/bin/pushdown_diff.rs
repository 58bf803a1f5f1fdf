//! pushdown-diff: run a directory of SQL cases against a row engine and its
//! columnar replica and report any divergence.
//!
//! Both backends are SQLite database files here; connection strings may
//! contain `{db}`, which is replaced by `--database`.

use std::ffi::OsString;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use pushdown_diff::report::CaseStatus;
use pushdown_diff::runner::{DiffRunner, build_report, load_cases, write_failure_artifacts};
use pushdown_diff::{ConnectionTemplate, HarnessSettings, NullOrder, SqliteBackend};

// ── CLI Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct CliConfig {
    row: Option<ConnectionTemplate>,
    replica: Option<ConnectionTemplate>,
    cases: Option<PathBuf>,
    wait_tables: Vec<String>,
    output_dir: Option<PathBuf>,
    json_output: bool,
    settings: HarnessSettings,
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() {
    let exit_code = run_cli(std::env::args_os());
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run_cli<I>(os_args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let raw: Vec<String> = os_args
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let tail = if raw.len() > 1 { &raw[1..] } else { &[] };

    if tail.is_empty() || tail.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return 0;
    }

    match parse_args(tail) {
        Ok(config) => run(&config),
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!();
            print_help();
            2
        }
    }
}

fn parse_args(tail: &[String]) -> Result<CliConfig, String> {
    let mut config = CliConfig::default();
    let mut args = tail.iter();

    while let Some(arg) = args.next() {
        let mut value = || {
            args.next()
                .cloned()
                .ok_or_else(|| format!("{arg} requires a value"))
        };
        match arg.as_str() {
            "--row" => config.row = Some(ConnectionTemplate::new(value()?)),
            "--replica" => config.replica = Some(ConnectionTemplate::new(value()?)),
            "--cases" => config.cases = Some(PathBuf::from(value()?)),
            "--database" => config.settings.database = value()?,
            "--wait" => config.wait_tables.push(value()?),
            "--output" => config.output_dir = Some(PathBuf::from(value()?)),
            "--timeout" => {
                let v = value()?;
                let secs = v
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --timeout: {v}"))?;
                config.settings.poll_timeout = Duration::from_secs(secs);
            }
            "--interval-ms" => {
                let v = value()?;
                let ms = v
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --interval-ms: {v}"))?;
                config.settings.poll_interval = Duration::from_millis(ms);
            }
            "--null-order" => {
                config.settings.null_order = match value()?.as_str() {
                    "first" => NullOrder::First,
                    "as-empty" => NullOrder::AsEmpty,
                    other => return Err(format!("invalid --null-order: {other}")),
                };
            }
            "--json" => config.json_output = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if config.row.is_none() || config.replica.is_none() || config.cases.is_none() {
        return Err("--row, --replica and --cases are required".to_owned());
    }
    Ok(config)
}

fn print_help() {
    let text = "\
pushdown-diff: compare query results between a row engine and its replica

USAGE:
    pushdown-diff --row <CONN> --replica <CONN> --cases <DIR> [OPTIONS]

OPTIONS:
    --row <CONN>            Row engine database; `{db}` is replaced by --database
    --replica <CONN>        Replica database; `{db}` is replaced by --database
    --cases <DIR>           Directory of *.sql cases, one query per file
    --database <NAME>       Database under test (default: test)
    --wait <TABLE>          Wait for TABLE's replica before comparing (repeatable)
    --timeout <SECS>        Replica wait timeout per table (default: 300)
    --interval-ms <MS>      Pause between replica probes (default: 200)
    --null-order <ORDER>    NULL sort order: first | as-empty (default: first)
    --output <DIR>          Write report.json and failure artifacts here
    --json                  Print the report as JSON instead of a summary
    -h, --help              Show this help message
";
    let _ = io::stdout().write_all(text.as_bytes());
}

// ── Run ──────────────────────────────────────────────────────────────────

fn run(config: &CliConfig) -> i32 {
    let (Some(row_tpl), Some(replica_tpl), Some(cases_dir)) =
        (&config.row, &config.replica, &config.cases)
    else {
        return 2;
    };
    let settings = &config.settings;
    let database = settings.database.as_str();

    let cases = match load_cases(cases_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return 2;
        }
    };

    let backends = SqliteBackend::open(row_tpl.for_database(database))
        .and_then(|row| Ok((row, SqliteBackend::open(replica_tpl.for_database(database))?)));
    let (row, replica) = match backends {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    if !config.wait_tables.is_empty() {
        let poller = settings.to_poller();
        if let Err(e) = poller.wait_all(&replica, database, config.wait_tables.as_slice()) {
            eprintln!("error: {e}");
            return 1;
        }
    }

    let runner = DiffRunner::new(&row, &replica, settings.to_comparator());
    let outcomes = runner.run_all(&cases);
    let report = build_report(database, &outcomes);

    if let Some(dir) = &config.output_dir {
        let written = report.write_json(&dir.join("report.json")).and_then(|()| {
            outcomes
                .iter()
                .filter(|o| o.status() != CaseStatus::Matched)
                .try_for_each(|o| write_failure_artifacts(o, dir).map(drop))
        });
        if let Err(e) = written {
            eprintln!("error: failed to write output: {e}");
            return 1;
        }
    }

    if config.json_output {
        match report.to_pretty_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return 1;
            }
        }
    } else {
        for case in &report.cases {
            let status = format!("{:?}", case.status).to_uppercase();
            match &case.detail {
                Some(detail) => println!("{status:<10} {}  {detail}", case.name),
                None => println!("{status:<10} {}", case.name),
            }
        }
        let s = report.summary;
        println!(
            "\n{} cases: {} matched, {} mismatched, {} errors",
            s.total, s.matched, s.mismatched, s.errors
        );
    }

    i32::from(!report.all_matched())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pushdown_diff::QueryCapability;

    use super::*;

    fn run_with(args: &[&str]) -> i32 {
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        run_cli(os_args)
    }

    fn seed(path: &std::path::Path, sql: &str) {
        let backend = SqliteBackend::open(path).unwrap();
        backend.execute_batch(sql).unwrap();
    }

    #[test]
    fn help_exits_zero() {
        assert_eq!(run_with(&["pushdown-diff", "--help"]), 0);
        assert_eq!(run_with(&["pushdown-diff"]), 0);
    }

    #[test]
    fn missing_required_args_exit_two() {
        assert_eq!(run_with(&["pushdown-diff", "--json"]), 2);
        assert_eq!(run_with(&["pushdown-diff", "--row"]), 2);
        assert_eq!(run_with(&["pushdown-diff", "--bogus"]), 2);
    }

    #[test]
    fn parse_args_fills_settings() {
        let args: Vec<String> = [
            "--row", "r/{db}.db", "--replica", "p/{db}.db", "--cases", "c", "--database", "tpch",
            "--wait", "a", "--wait", "b", "--timeout", "5", "--interval-ms", "0", "--null-order",
            "as-empty",
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
        let config = parse_args(&args).unwrap();
        assert_eq!(config.settings.database, "tpch");
        assert_eq!(config.wait_tables, ["a", "b"]);
        assert_eq!(config.settings.poll_timeout, Duration::from_secs(5));
        assert_eq!(config.settings.poll_interval, Duration::ZERO);
        assert_eq!(config.settings.null_order, NullOrder::AsEmpty);
        assert_eq!(
            config.row.unwrap().for_database(&config.settings.database),
            "r/tpch.db"
        );
    }

    #[test]
    fn parse_args_rejects_bad_numbers() {
        let args: Vec<String> = ["--timeout", "soon"].iter().map(|s| (*s).to_owned()).collect();
        assert!(parse_args(&args).unwrap_err().contains("--timeout"));
    }

    #[test]
    fn end_to_end_match_and_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        seed(
            &dir.join("shop.row.db"),
            "CREATE TABLE t (id INTEGER, v TEXT); INSERT INTO t VALUES (1, 'a'), (2, NULL);",
        );
        seed(
            &dir.join("shop.replica.db"),
            "CREATE TABLE t (id INTEGER, v TEXT); INSERT INTO t VALUES (2, NULL), (1, 'a');",
        );
        let cases = dir.join("cases");
        std::fs::create_dir_all(&cases).unwrap();
        std::fs::write(cases.join("q1.sql"), "SELECT id, v FROM t").unwrap();

        let row = dir.join("{db}.row.db");
        let replica = dir.join("{db}.replica.db");
        let out = dir.join("out");
        let base = [
            "pushdown-diff",
            "--row",
            row.to_str().unwrap(),
            "--replica",
            replica.to_str().unwrap(),
            "--cases",
            cases.to_str().unwrap(),
            "--database",
            "shop",
            "--output",
            out.to_str().unwrap(),
        ];
        assert_eq!(run_with(&base), 0);
        assert!(out.join("report.json").exists());

        assert!(!out.join("q1.diff.md").exists());

        seed(&dir.join("shop.replica.db"), "INSERT INTO t VALUES (3, 'c');");
        assert_eq!(run_with(&base), 1);
        assert!(out.join("q1.diff.md").exists());
        assert!(out.join("q1.replica.txt").exists());
    }

    #[test]
    fn replica_wait_query_error_fails_run() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        seed(&dir.join("row.db"), "CREATE TABLE t (id INTEGER);");
        seed(&dir.join("replica.db"), "CREATE TABLE t (id INTEGER);");
        let cases = dir.join("cases");
        std::fs::create_dir_all(&cases).unwrap();
        std::fs::write(cases.join("q.sql"), "SELECT id FROM t").unwrap();

        // No replica metadata table at all: the probe is a query error.
        let code = run_with(&[
            "pushdown-diff",
            "--row",
            dir.join("row.db").to_str().unwrap(),
            "--replica",
            dir.join("replica.db").to_str().unwrap(),
            "--cases",
            cases.to_str().unwrap(),
            "--wait",
            "t",
        ]);
        assert_eq!(code, 1);
    }
}
