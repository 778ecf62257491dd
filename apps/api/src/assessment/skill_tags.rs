// Fixed skill patterns scanned against task text.
// Protected skills are only reported for low-exposure tasks, vulnerable skills
// only for high-exposure tasks; the aggregator enforces that pairing.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_TAGS: usize = 5;

struct SkillPattern {
    tag: &'static str,
    pattern: Regex,
}

fn compile(table: &[(&'static str, &str)]) -> Vec<SkillPattern> {
    table
        .iter()
        .map(|&(tag, pattern)| SkillPattern {
            tag,
            pattern: Regex::new(&format!(r"(?i)\b(?:{pattern})\b"))
                .expect("skill pattern table must compile"),
        })
        .collect()
}

static PROTECTED: Lazy<Vec<SkillPattern>> = Lazy::new(|| {
    compile(&[
        ("leadership", r"lead\w*|supervis\w*|manag\w*|mentor\w*|coach\w*"),
        ("negotiation", r"negotiat\w*|mediat\w*|persuad\w*"),
        ("creativity", r"creat\w*|design\w*|invent\w*|innovat\w*|artist\w*"),
        ("empathy", r"empath\w*|comfort\w*|counsel\w*|care for|patient care|emotional support"),
        ("strategic thinking", r"strateg\w*|long-term plan\w*|vision\w*"),
        ("relationship building", r"relationship\w*|rapport|networking|client relations"),
        ("complex judgment", r"judg\w*|diagnos\w*|assess\w*|evaluat\w*|decid\w*|decision\w*"),
        ("physical work", r"physical\w*|manual\w*|lift\w*|repair\w*|install\w*|hands-on"),
    ])
});

static VULNERABLE: Lazy<Vec<SkillPattern>> = Lazy::new(|| {
    compile(&[
        ("data entry", r"data entry|enter\w* data|input\w* data|keying|typing"),
        ("scheduling", r"schedul\w*|appointment\w*|calendar\w*|booking\w*"),
        ("routine research", r"research\w*|look up|lookup|gather\w* information"),
        ("report generation", r"reports?|reporting|summar\w*"),
        ("repetitive work", r"repetitive|routine|standardi[sz]ed|template\w*"),
        ("calculation", r"calculat\w*|comput\w*|bookkeep\w*|arithmetic|invoic\w*"),
        ("translation and transcription", r"translat\w*|transcri\w*"),
        ("filing and sorting", r"fil(?:e|es|ing)|sort\w*|archiv\w*|records?"),
    ])
});

fn scan<'a>(
    patterns: &'a [SkillPattern],
    text: &'a str,
) -> impl Iterator<Item = &'static str> + 'a {
    patterns
        .iter()
        .filter(move |p| p.pattern.is_match(text))
        .map(|p| p.tag)
}

pub fn protected_tags(text: &str) -> impl Iterator<Item = &'static str> + '_ {
    scan(&PROTECTED, text)
}

pub fn vulnerable_tags(text: &str) -> impl Iterator<Item = &'static str> + '_ {
    scan(&VULNERABLE, text)
}

/// First-seen order, no duplicates, at most `MAX_TAGS`.
#[derive(Debug, Default)]
pub struct TagCollector {
    tags: Vec<String>,
}

impl TagCollector {
    pub fn extend<'a>(&mut self, tags: impl Iterator<Item = &'a str>) {
        for tag in tags {
            if self.tags.len() == MAX_TAGS {
                return;
            }
            if !self.tags.iter().any(|t| t == tag) {
                self.tags.push(tag.to_string());
            }
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.tags
    }
}
