// Evasion-pattern templates.
//
// A template is a list of letter slots: "f|ph u|v|@|*|0 c|(? k|q".
// Slots are separated by whitespace, a slot's alternatives by "|", and a
// trailing "?" marks a slot optional. Each template compiles into one
// regex anchored at a word start that accepts either spelling:
//
//   tight:  slots back to back, each repeated one or more times
//            ("fuuuck", "f@ck", "phuk")
//   spaced: every slot separated by at least one non-word character
//            ("f.u.c.k", "f u c k")
//
// Requiring a separator between *every* slot in the spaced form is what
// keeps "it's hit" from reading as "s hit".
//
// A word start is the start of the text or any non-word character, not
// `\b`: the first slot may itself be a symbol ("$hit", "@sshole"), and
// `\b` never sits between a space and a symbol. The spelling is the
// regex's first capture group; use `spelling_matches` to get it.

use anyhow::{bail, Result};
use regex::{Match, Regex};

/// Separator allowed between slots in the spaced spelling.
const SEPARATOR: &str = r"[\W_]+";

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    alternatives: Vec<String>,
    optional: bool,
}

impl Slot {
    fn group(&self) -> String {
        let alts: Vec<String> = self.alternatives.iter().map(|a| regex::escape(a)).collect();
        format!("(?:{})", alts.join("|"))
    }
}

fn parse_template(template: &str) -> Result<Vec<Slot>> {
    let mut slots = Vec::new();
    for token in template.split_whitespace() {
        let (body, optional) = match token.strip_suffix('?') {
            Some(body) if !body.is_empty() => (body, true),
            _ => (token, false),
        };
        let alternatives: Vec<String> = body
            .split('|')
            .filter(|a| !a.is_empty())
            .map(str::to_lowercase)
            .collect();
        if alternatives.is_empty() {
            bail!("Empty slot {token:?} in pattern template {template:?}");
        }
        slots.push(Slot {
            alternatives,
            optional,
        });
    }

    let Some(first) = slots.first() else {
        bail!("Pattern template is empty");
    };
    if first.optional {
        bail!("First slot of pattern template {template:?} cannot be optional");
    }

    Ok(slots)
}

/// Translate a template into regex source.
pub fn template_to_regex(template: &str) -> Result<String> {
    let slots = parse_template(template)?;

    let tight: String = slots
        .iter()
        .map(|s| format!("{}{}", s.group(), if s.optional { "*" } else { "+" }))
        .collect();

    let mut spaced = slots[0].group();
    for slot in &slots[1..] {
        if slot.optional {
            spaced.push_str(&format!("(?:{SEPARATOR}{})?", slot.group()));
        } else {
            spaced.push_str(&format!("{SEPARATOR}{}", slot.group()));
        }
    }

    Ok(format!(r"(?:^|\W)({tight}|{spaced})"))
}

/// Compile a template into a regex over lowercased text.
pub fn compile_template(template: &str) -> Result<Regex> {
    let source = template_to_regex(template)?;
    Ok(Regex::new(&source)?)
}

/// The obfuscated spellings a compiled template finds in `text`, without
/// the word-start character in front of them.
pub fn spelling_matches<'r, 't>(
    regex: &'r Regex,
    text: &'t str,
) -> impl Iterator<Item = Match<'t>> + 'r
where
    't: 'r,
{
    regex.captures_iter(text).filter_map(|caps| caps.get(1))
}
