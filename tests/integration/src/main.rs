//! Integration Test Harness
//!
//! Runs each integration test category in turn and prints a summary.
//!
//! # Usage
//!
//! Run all tests:
//! ```text
//! cargo run -p integration-tests
//! ```
//!
//! Run one category:
//! ```text
//! cargo test -p integration-tests --test loopback_tests
//! cargo test -p integration-tests --test rebinder_tests
//! cargo test -p integration-tests --test store_service_tests
//! ```
//!
//! With more logging:
//! ```text
//! RUST_LOG=debug cargo run -p integration-tests
//! ```

use std::process::{Command, ExitCode};
use std::time::{Duration, Instant};

struct TestCategory {
    name: &'static str,
    description: &'static str,
    test_name: &'static str,
}

const TEST_CATEGORIES: &[TestCategory] = &[
    TestCategory {
        name: "Loopback Tests",
        description: "Calls, parameters, errors and deadlines over one connection",
        test_name: "loopback_tests",
    },
    TestCategory {
        name: "Rebinder Tests",
        description: "Publishing through the directory, restarts and leases",
        test_name: "rebinder_tests",
    },
    TestCategory {
        name: "Store Service Tests",
        description: "The configuration store served and found remotely",
        test_name: "store_service_tests",
    },
];

struct CategoryResult {
    name: &'static str,
    success: bool,
    duration: Duration,
    summary: String,
}

fn print_categories() {
    println!("Test Categories:");
    println!("{}", "-".repeat(80));
    for (i, cat) in TEST_CATEGORIES.iter().enumerate() {
        println!("  {}. {} - {}", i + 1, cat.name, cat.description);
    }
    println!("{}", "-".repeat(80));
    println!();
}

fn run_category(category: &TestCategory) -> CategoryResult {
    println!("\n{}", "=".repeat(80));
    println!("Running: {}", category.name);
    println!("{}", "=".repeat(80));

    let start = Instant::now();
    let output = Command::new("cargo")
        .args(["test", "-p", "integration-tests", "--test", category.test_name, "--", "--nocapture"])
        .output();
    let duration = start.elapsed();

    let (success, summary) = match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.is_empty() {
                println!("{}", stdout);
            }
            if !stderr.is_empty() {
                eprintln!("{}", stderr);
            }
            if output.status.success() {
                (true, "PASSED".to_string())
            } else {
                (false, format!("FAILED (exit code: {:?})", output.status.code()))
            }
        }
        Err(e) => (false, format!("Failed to execute: {}", e)),
    };

    CategoryResult {
        name: category.name,
        success,
        duration,
        summary,
    }
}

fn main() -> ExitCode {
    println!("{}", "=".repeat(80));
    println!("Broker Integration Test Suite");
    println!("{}", "=".repeat(80));
    print_categories();

    let total_start = Instant::now();
    let results: Vec<CategoryResult> = TEST_CATEGORIES.iter().map(run_category).collect();
    let total_duration = total_start.elapsed();

    println!("\n{}", "=".repeat(80));
    println!("FINAL SUMMARY");
    println!("{}", "=".repeat(80));

    let passed = results.iter().filter(|r| r.success).count();
    let failed = results.len() - passed;
    println!("\nCategories: {} | Passed: {} | Failed: {}", results.len(), passed, failed);
    println!("Total Duration: {:?}", total_duration);
    println!();

    println!("{:<30} {:<10} {:<15} {}", "Category", "Status", "Duration", "Details");
    println!("{}", "-".repeat(80));
    for result in &results {
        let status = if result.success { "PASS" } else { "FAIL" };
        println!(
            "{:<30} {:<10} {:<15?} {}",
            result.name, status, result.duration, result.summary
        );
    }
    println!("{}", "=".repeat(80));

    if failed > 0 {
        println!("\nSome tests failed!");
        ExitCode::FAILURE
    } else {
        println!("\nAll tests passed!");
        ExitCode::SUCCESS
    }
}
