//! Technology tag extraction.
//!
//! Tags are matched against a fixed vocabulary. Each keyword lists the
//! spellings that may match anywhere in the content, and the spellings that
//! are too ambiguous in prose ("go", "rust", "rails") and only count when the
//! project declares them in its stack. Extraction is pure and cannot fail.

use std::collections::BTreeSet;

struct Keyword {
    tag: &'static str,
    anywhere: &'static [&'static str],
    stack_only: &'static [&'static str],
}

const VOCABULARY: &[Keyword] = &[
    Keyword { tag: "javascript", anywhere: &["javascript", "js", "ecmascript"], stack_only: &[] },
    Keyword { tag: "typescript", anywhere: &["typescript", "ts"], stack_only: &[] },
    Keyword { tag: "react", anywhere: &["react", "reactjs", "react.js"], stack_only: &[] },
    Keyword { tag: "vue", anywhere: &["vue", "vuejs", "vue.js"], stack_only: &[] },
    Keyword { tag: "angular", anywhere: &["angular", "angularjs"], stack_only: &[] },
    Keyword { tag: "svelte", anywhere: &["svelte", "sveltekit"], stack_only: &[] },
    Keyword { tag: "nextjs", anywhere: &["nextjs", "next.js"], stack_only: &[] },
    Keyword { tag: "nodejs", anywhere: &["nodejs", "node.js"], stack_only: &["node"] },
    Keyword { tag: "express", anywhere: &["expressjs", "express.js"], stack_only: &["express"] },
    Keyword { tag: "python", anywhere: &["python", "python3"], stack_only: &[] },
    Keyword { tag: "django", anywhere: &["django"], stack_only: &[] },
    Keyword { tag: "flask", anywhere: &[], stack_only: &["flask"] },
    Keyword { tag: "fastapi", anywhere: &["fastapi"], stack_only: &[] },
    Keyword { tag: "ruby", anywhere: &[], stack_only: &["ruby"] },
    Keyword { tag: "rails", anywhere: &["ruby on rails", "ror"], stack_only: &["rails"] },
    Keyword { tag: "go", anywhere: &["golang"], stack_only: &["go"] },
    Keyword { tag: "rust", anywhere: &["rustlang", "cargo"], stack_only: &["rust"] },
    Keyword { tag: "java", anywhere: &["jvm"], stack_only: &["java"] },
    Keyword { tag: "spring", anywhere: &["spring boot", "springboot"], stack_only: &["spring"] },
    Keyword { tag: "kotlin", anywhere: &["kotlin"], stack_only: &[] },
    Keyword { tag: "swift", anywhere: &["swiftui"], stack_only: &["swift"] },
    Keyword { tag: "csharp", anywhere: &["c#", "csharp"], stack_only: &[] },
    Keyword { tag: "dotnet", anywhere: &[".net", "dotnet", "asp.net"], stack_only: &[] },
    Keyword { tag: "php", anywhere: &["php"], stack_only: &[] },
    Keyword { tag: "laravel", anywhere: &["laravel"], stack_only: &[] },
    Keyword { tag: "elixir", anywhere: &["elixir"], stack_only: &[] },
    Keyword { tag: "phoenix", anywhere: &[], stack_only: &["phoenix"] },
    Keyword { tag: "postgresql", anywhere: &["postgresql", "postgres", "psql"], stack_only: &[] },
    Keyword { tag: "mysql", anywhere: &["mysql", "mariadb"], stack_only: &[] },
    Keyword { tag: "sqlite", anywhere: &["sqlite", "sqlite3"], stack_only: &[] },
    Keyword { tag: "mongodb", anywhere: &["mongodb", "mongo"], stack_only: &[] },
    Keyword { tag: "redis", anywhere: &["redis"], stack_only: &[] },
    Keyword { tag: "graphql", anywhere: &["graphql"], stack_only: &[] },
    Keyword { tag: "tailwind", anywhere: &["tailwind", "tailwindcss"], stack_only: &[] },
    Keyword { tag: "docker", anywhere: &["docker", "dockerfile"], stack_only: &[] },
    Keyword { tag: "kubernetes", anywhere: &["kubernetes", "k8s"], stack_only: &[] },
    Keyword { tag: "terraform", anywhere: &["terraform"], stack_only: &[] },
    Keyword { tag: "aws", anywhere: &["aws"], stack_only: &[] },
    Keyword { tag: "gcp", anywhere: &["gcp"], stack_only: &[] },
    Keyword { tag: "azure", anywhere: &["azure"], stack_only: &[] },
];

/// Extract technology tags from ruleset content and a declared stack.
///
/// The result is lowercase, deduplicated, and sorted. Single-token keywords
/// match whole tokens only, so "go" never matches inside "google".
pub fn extract_tags<S: AsRef<str>>(content: &str, stack: &[S]) -> Vec<String> {
    let content_text = normalized(content);
    let stack_texts: Vec<String> = stack.iter().map(|s| normalized(s.as_ref())).collect();

    let mut tags = BTreeSet::new();
    for keyword in VOCABULARY {
        let in_content = keyword.anywhere.iter().any(|p| contains_phrase(&content_text, p));
        let in_stack = stack_texts.iter().any(|text| {
            keyword
                .anywhere
                .iter()
                .chain(keyword.stack_only)
                .any(|p| contains_phrase(text, p))
        });
        if in_content || in_stack {
            tags.insert(keyword.tag.to_string());
        }
    }
    tags.into_iter().collect()
}

/// Lowercase tokens joined by single spaces, padded so every token is
/// surrounded by a space.
fn normalized(text: &str) -> String {
    let lower = text.to_lowercase();
    let tokens = lower
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.')))
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| !token.is_empty());

    let mut out = String::from(" ");
    for token in tokens {
        out.push_str(token);
        out.push(' ');
    }
    out
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.contains(&format!(" {phrase} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_STACK: &[&str] = &[];

    #[test]
    fn aliases_map_to_canonical_tags() {
        let tags = extract_tags("Use golang with Postgres and k8s.", NO_STACK);
        assert_eq!(tags, vec!["go", "kubernetes", "postgresql"]);
    }

    #[test]
    fn stack_declares_ambiguous_keywords() {
        let tags = extract_tags("# Rules\nKeep handlers small.", &["Go", "PostgreSQL"]);
        assert_eq!(tags, vec!["go", "postgresql"]);
    }

    #[test]
    fn ambiguous_words_in_prose_are_ignored() {
        let tags = extract_tags("Let's go! Avoid rust on old rails.", NO_STACK);
        assert!(tags.is_empty(), "{tags:?}");
    }

    #[test]
    fn whole_words_only() {
        let tags = extract_tags("Search with google; read the jsonl; typescripting", NO_STACK);
        assert!(tags.is_empty(), "{tags:?}");
    }

    #[test]
    fn dotted_and_symbol_keywords() {
        let tags = extract_tags("Node.js backend, C# tools, ASP.NET site. Use Vue.js.", NO_STACK);
        assert_eq!(tags, vec!["csharp", "dotnet", "nodejs", "vue"]);
    }

    #[test]
    fn multi_word_phrases() {
        let tags = extract_tags("Built on Ruby on Rails and Spring Boot", NO_STACK);
        assert_eq!(tags, vec!["rails", "spring"]);
    }

    #[test]
    fn output_is_sorted_and_deduplicated() {
        let tags = extract_tags(
            "React react REACT with TypeScript and ts",
            &["React", "typescript"],
        );
        assert_eq!(tags, vec!["react", "typescript"]);
    }

    #[test]
    fn empty_inputs_yield_no_tags() {
        assert!(extract_tags("", NO_STACK).is_empty());
        assert!(extract_tags("   ", &["  "]).is_empty());
    }

    #[test]
    fn unknown_stack_entries_are_skipped() {
        let tags = extract_tags("", &["Gin", "Ruby on Rails 7"]);
        assert_eq!(tags, vec!["rails", "ruby"]);
    }
}
