use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Directories holding this crate's own Rust sources. Nothing outside them is scanned.
const SOURCE_DIRS: [&str; 6] = ["sero", "stats", "report", "src", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenWord,
    StarsInComment,
    UppercaseComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> String {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Rule::ForbiddenWord => format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|")),
            Rule::StarsInComment => r"(//|/\*).*\*\*".to_string(),
            Rule::UppercaseComment => r"(//|/\*).*".to_string(),
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn explanation(self) -> String {
        match self {
            Rule::UnderscorePrefix => "Underscore-prefixed names are not allowed in this project.\n   \
                 Either use the binding (removing the underscore) or remove it completely."
                .to_string(),
            Rule::ForbiddenWord => format!(
                "Comments containing {} are not allowed in this project.\n   \
                 Remove them completely rather than commenting them out.",
                FORBIDDEN_WORDS.join(", ")
            ),
            Rule::StarsInComment => {
                "The '**' pattern is not allowed in regular comments (it is allowed in /// doc comments)."
                    .to_string()
            }
            Rule::UppercaseComment => {
                "Comments where every alphabetic character is uppercase are not allowed.".to_string()
            }
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes are not allowed in this project.\n   \
                 Either use the code or remove it completely."
                .to_string(),
        }
    }

    /// Decides whether a line the regex matched is a real violation.
    fn is_violation(self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            Rule::UnderscorePrefix => !is_comment(line) && !underscore_only_in_strings(line),
            Rule::ForbiddenWord | Rule::AllowDeadCode => true,
            Rule::StarsInComment => !trimmed.starts_with("///"),
            Rule::UppercaseComment => comment_text(line).is_some_and(|text| {
                let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
            }),
        }
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

fn underscore_only_in_strings(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(index, part)| index % 2 == 1 && part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim())
    } else {
        let start = line.find("/*")? + 2;
        let body = &line[start..];
        Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
    }
}

// Collects every offending line of one file for one rule.
struct RuleCollector {
    rule: Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl RuleCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: {} policy violation(s) in {}:\n",
            self.violations.len(),
            self.file_path.display()
        );
        for violation in &self.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", self.rule.explanation()));
        Some(message)
    }
}

impl Sink for RuleCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn enforce(rule: Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
    let mut searcher = Searcher::new();
    for path in files {
        let mut collector = RuleCollector::new(rule, path);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(message) = collector.error_message() {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=SEROSCAN_BUILD_TIMESTAMP={timestamp}");

    let files = source_files();
    let rules = [
        Rule::UnderscorePrefix,
        Rule::ForbiddenWord,
        Rule::StarsInComment,
        Rule::UppercaseComment,
        Rule::AllowDeadCode,
    ];
    for rule in rules {
        if let Err(e) = enforce(rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
