use crate::scenarios::TestResult;
use colored::*;

pub fn print_test_summary(results: &[TestResult]) {
    for result in results {
        if result.passed {
            println!(
                "{} {} {}",
                "PASS".on_green().black().bold(),
                result.name.bold(),
                format!("({})", result.details).dimmed()
            );
        } else {
            println!(
                "{} {} {}",
                "FAIL".on_red().white().bold(),
                result.name.bold(),
                result.details.red()
            );
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    println!(
        "\n{} {}/{} scenarios passed",
        "→".blue(),
        passed,
        results.len()
    );
}
