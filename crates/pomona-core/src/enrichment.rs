//! Deterministic enrichment of postings.
//!
//! Derives seniority, experience range, skills, education and industry from a
//! posting's title and description with fixed keyword tables and regular
//! expressions. Pure: the same posting always yields the same enrichment.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{EducationLevel, JobEnrichment, NormalizedJob, Seniority};

static SENIORITY_RULES: LazyLock<Vec<(Seniority, Regex)>> = LazyLock::new(|| {
    [
        (Seniority::Intern, r"\b(intern|internship|co-op|apprentice(ship)?)\b"),
        (
            Seniority::Executive,
            r"\b(chief|cto|ceo|cfo|coo|vp|vice president|head of|director)\b",
        ),
        (Seniority::Principal, r"\b(principal|staff|distinguished)\b"),
        (Seniority::Lead, r"\b(lead|manager|team lead)\b"),
        (Seniority::Senior, r"\b(senior|sr\.?|snr)(\s|$|,)"),
        (
            Seniority::Junior,
            r"\b(junior|jr\.?|entry[- ]level|graduate|new grad)(\s|$|,)",
        ),
        (Seniority::Mid, r"\b(mid[- ]?level|intermediate)\b"),
    ]
    .into_iter()
    .map(|(level, pattern)| (level, case_insensitive(pattern)))
    .collect()
});

static EXPERIENCE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    case_insensitive(r"(\d{1,2})\s*\+?\s*(?:-|–|to)\s*(\d{1,2})\s*\+?\s*(?:years?|yrs?)")
});

static EXPERIENCE_MIN: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"(\d{1,2})\s*\+?\s*(?:years?|yrs?)"));

static PREFERRED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    case_insensitive(r"\b(preferred|nice[- ]to[- ]have|bonus( points)?|desired qualifications)\b")
});

static EDUCATION_RULES: LazyLock<Vec<(EducationLevel, Regex)>> = LazyLock::new(|| {
    [
        (EducationLevel::HighSchool, r"\b(high school|ged)\b"),
        (EducationLevel::Associate, r"\bassociate'?s degree\b"),
        (
            EducationLevel::Bachelor,
            r"\b(bachelor'?s|bachelor of|b\.?sc|bs degree|ba degree|undergraduate degree)\b",
        ),
        (
            EducationLevel::Master,
            r"\b(master'?s|master of|m\.?sc|ms degree|mba)\b",
        ),
        (EducationLevel::Doctorate, r"\b(ph\.?d|doctorate|doctoral)\b"),
    ]
    .into_iter()
    .map(|(level, pattern)| (level, case_insensitive(pattern)))
    .collect()
});

/// Display name and aliases for each recognised skill.
const SKILLS: &[(&str, &[&str])] = &[
    ("Rust", &["rust"]),
    // Bare "go", "ts", "ml" and "node" are ordinary words; those skills need context.
    (
        "Go",
        &["golang", "go lang", "go developer", "go engineer", "go programming", "go language"],
    ),
    ("Python", &["python"]),
    ("Java", &["java"]),
    ("Kotlin", &["kotlin"]),
    ("Scala", &["scala"]),
    ("JavaScript", &["javascript", "js"]),
    ("TypeScript", &["typescript"]),
    ("C++", &["c++", "cpp"]),
    ("C#", &["c#", "csharp"]),
    (".NET", &[".net", "dotnet"]),
    ("Ruby", &["ruby", "rails", "ruby on rails"]),
    ("PHP", &["php"]),
    ("Swift", &["swift"]),
    ("SQL", &["sql"]),
    ("PostgreSQL", &["postgresql", "postgres"]),
    ("MySQL", &["mysql"]),
    ("MongoDB", &["mongodb", "mongo"]),
    ("Redis", &["redis"]),
    ("Kafka", &["kafka"]),
    ("Spark", &["spark", "pyspark"]),
    ("React", &["react", "react.js", "reactjs"]),
    ("Angular", &["angular"]),
    ("Vue", &["vue", "vue.js", "vuejs"]),
    ("Node.js", &["node.js", "nodejs"]),
    ("Django", &["django"]),
    ("GraphQL", &["graphql"]),
    ("AWS", &["aws", "amazon web services"]),
    ("GCP", &["gcp", "google cloud"]),
    ("Azure", &["azure"]),
    ("Docker", &["docker"]),
    ("Kubernetes", &["kubernetes", "k8s"]),
    ("Terraform", &["terraform"]),
    ("Linux", &["linux"]),
    ("Git", &["git"]),
    (
        "Machine Learning",
        &["machine learning", "ml engineer", "ml engineering", "ml models", "mlops"],
    ),
    ("TensorFlow", &["tensorflow"]),
    ("PyTorch", &["pytorch"]),
    ("Excel", &["excel"]),
    ("Salesforce", &["salesforce"]),
];

static SKILL_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SKILLS
        .iter()
        .map(|(name, aliases)| {
            let alternation = aliases
                .iter()
                .map(|a| regex::escape(a))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?:^|[^a-z0-9+#.])(?:{})(?:$|[^a-z0-9+#])", alternation);
            (*name, case_insensitive(&pattern))
        })
        .collect()
});

/// Industry name and the keywords that vote for it.
const INDUSTRIES: &[(&str, &[&str])] = &[
    (
        "finance",
        &["fintech", "bank", "banking", "payments", "trading", "insurance", "lending"],
    ),
    (
        "healthcare",
        &["healthcare", "hospital", "clinical", "patient", "pharma", "medical"],
    ),
    ("retail", &["e-commerce", "ecommerce", "retail", "marketplace"]),
    (
        "education",
        &["edtech", "education", "university", "students", "learning platform"],
    ),
    ("government", &["federal", "government", "public sector", "agency"]),
    ("security", &["cybersecurity", "security operations", "threat"]),
    ("gaming", &["gaming", "game studio", "video game"]),
    ("media", &["media", "publishing", "newsroom", "streaming"]),
    ("logistics", &["logistics", "supply chain", "shipping", "freight"]),
];

static INDUSTRY_RULES: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    INDUSTRIES
        .iter()
        .map(|(name, keywords)| {
            let patterns = keywords
                .iter()
                .map(|k| case_insensitive(&format!(r"\b{}\b", regex::escape(k))))
                .collect();
            (*name, patterns)
        })
        .collect()
});

fn case_insensitive(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by the tests below.
    Regex::new(&format!("(?i){}", pattern)).expect("enrichment pattern is valid")
}

/// Derives [`JobEnrichment`] from a posting.
pub fn enrich(job: &NormalizedJob) -> JobEnrichment {
    let description = job.description.as_deref().unwrap_or("");
    let full_text = format!("{}\n{}", job.title, description);

    let (experience_min_years, experience_max_years) = experience_range(description);
    let seniority = seniority_from_title(&job.title)
        .or_else(|| experience_min_years.map(seniority_from_experience));

    let (required_skills, preferred_skills) = split_skills(&full_text);

    JobEnrichment {
        seniority,
        experience_min_years,
        experience_max_years,
        required_skills,
        preferred_skills,
        education_level: education_level(description),
        industry: industry(&full_text),
    }
}

fn seniority_from_title(title: &str) -> Option<Seniority> {
    SENIORITY_RULES
        .iter()
        .find(|(_, re)| re.is_match(title))
        .map(|(level, _)| *level)
}

fn seniority_from_experience(min_years: u32) -> Seniority {
    match min_years {
        0..=1 => Seniority::Junior,
        2..=4 => Seniority::Mid,
        5..=7 => Seniority::Senior,
        _ => Seniority::Lead,
    }
}

/// First "N-M years" range, else first "N+ years" as a lower bound.
fn experience_range(text: &str) -> (Option<u32>, Option<u32>) {
    let plausible = |n: u32| n <= 30;

    if let Some(caps) = EXPERIENCE_RANGE.captures(text) {
        let min = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let max = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        if let (Some(min), Some(max)) = (min, max)
            && plausible(max)
            && min <= max
        {
            return (Some(min), Some(max));
        }
    }

    let min = EXPERIENCE_MIN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| plausible(*n));
    (min, None)
}

fn skills_in(text: &str) -> Vec<String> {
    SKILL_RULES
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Skills before the first "preferred"-style marker are required; skills only
/// found after it are preferred.
fn split_skills(text: &str) -> (Vec<String>, Vec<String>) {
    let (required_part, preferred_part) = match PREFERRED_MARKER.find(text) {
        Some(m) => text.split_at(m.start()),
        None => (text, ""),
    };

    let required = skills_in(required_part);
    let preferred = skills_in(preferred_part)
        .into_iter()
        .filter(|s| !required.contains(s))
        .collect();
    (required, preferred)
}

/// Lowest education level mentioned, i.e. the minimum the posting asks for.
fn education_level(text: &str) -> Option<EducationLevel> {
    EDUCATION_RULES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(level, _)| *level)
}

/// Industry with the most keyword hits; earlier table rows win ties.
fn industry(text: &str) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for (name, patterns) in INDUSTRY_RULES.iter() {
        let hits = patterns.iter().filter(|re| re.is_match(text)).count();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((name, hits));
        }
    }
    best.map(|(name, _)| name.to_string())
}
