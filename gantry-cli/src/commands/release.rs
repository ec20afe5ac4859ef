//! Release command handler
//!
//! Bumps the version recorded in the changelog and stamps a new dated
//! heading, so cutting a release is one command.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::ValueEnum;
use colored::*;
use std::fmt;

/// Which version component to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Patch,
    Minor,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Version {
    major: u64,
    minor: u64,
    patch: u64,
}

impl Version {
    fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    fn bump(self, level: Level) -> Self {
        match level {
            Level::Patch => Self {
                patch: self.patch + 1,
                ..self
            },
            Level::Minor => Self {
                major: self.major,
                minor: self.minor + 1,
                patch: 0,
            },
            Level::Major => Self {
                major: self.major + 1,
                minor: 0,
                patch: 0,
            },
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Finds the most recent version heading (`## X.Y.Z ...`)
fn latest_version(changelog: &str) -> Option<Version> {
    changelog.lines().find_map(|line| {
        let rest = line.strip_prefix("## ")?;
        let token = rest.split_whitespace().next()?;
        Version::parse(token)
    })
}

/// Inserts a new version section above the previous one
fn prepend_entry(changelog: &str, version: Version, date: &str, message: &str) -> String {
    let section = format!("## {version} ({date})\n\n- {message}\n");
    // A version heading on the very first line has no preceding newline
    if changelog.starts_with("## ") {
        return format!("{section}\n{changelog}");
    }
    match changelog.find("\n## ") {
        Some(pos) => {
            let (head, tail) = changelog.split_at(pos + 1);
            format!("{head}{section}\n{tail}")
        }
        None => {
            let mut out = changelog.to_string();
            if !out.ends_with('\n') {
                out.push('\n');
            }
            format!("{out}\n{section}")
        }
    }
}

/// Bump the version and stamp the changelog
pub fn release(level: Level, message: &str, changelog_path: &str) -> Result<i32> {
    let text = std::fs::read_to_string(changelog_path)
        .with_context(|| format!("Failed to read {changelog_path}"))?;

    let Some(current) = latest_version(&text) else {
        bail!("{changelog_path} has no '## X.Y.Z' version heading to bump");
    };

    let next = current.bump(level);
    let date = Utc::now().format("%Y-%m-%d").to_string();
    let stamped = prepend_entry(&text, next, &date, message);

    std::fs::write(changelog_path, stamped)
        .with_context(|| format!("Failed to write {changelog_path}"))?;

    println!(
        "{}",
        format!("✓ Version bumped: {current} -> {next}").green().bold()
    );
    println!("  {} {}", "Stamped".green(), changelog_path.cyan());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Review the changelog entry");
    println!("  2. Tag the release: {}", format!("git tag v{next}").cyan());
    println!("  3. Push with {}", "git push --tags".cyan());

    Ok(0)
}
