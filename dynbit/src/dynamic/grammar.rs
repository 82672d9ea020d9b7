use crate::AppError;
use once_cell::sync::OnceCell;
use regex::Regex;

static NON_IDENTIFIER: OnceCell<Regex> = OnceCell::new();

/// Replaces every non identifier character with `_`.
pub fn sanitize_identifier(value: &str) -> Result<String, AppError> {
    let re = NON_IDENTIFIER.get_or_try_init(|| Regex::new(r"\W"))?;
    Ok(re.replace_all(value, "_").into_owned())
}

/// Maps a variable part to a concrete field name and back.
///
/// The recognizer defaults to `^{base}_(.+)$` and the format to `{base}_%s`. The format
/// understands `%s` (the variable part) and `%%` (a literal `%`).
#[derive(Debug)]
pub struct NameGrammar {
    base: String,
    format: Option<String>,
    pattern: OnceCell<Regex>,
}

impl NameGrammar {
    /// A custom pattern is compiled right away so an invalid one fails at declaration.
    pub fn new(base: &str, pattern: Option<&str>, format: Option<&str>) -> Result<NameGrammar, AppError> {
        let compiled = match pattern {
            Some(src) => OnceCell::with_value(Regex::new(src)?),
            None => OnceCell::new(),
        };
        Ok(NameGrammar { base: base.to_string(), format: format.map(str::to_string), pattern: compiled })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn pattern(&self) -> Result<&Regex, AppError> {
        self.pattern.get_or_try_init(|| Ok(Regex::new(&format!("^{}_(.+)$", regex::escape(&self.base)))?))
    }

    pub fn format(&self) -> String {
        match &self.format {
            Some(format) => format.clone(),
            None => format!("{}_%s", self.base.replace('%', "%%")),
        }
    }

    pub fn accepts(&self, candidate: &str) -> Result<bool, AppError> {
        Ok(self.pattern()?.is_match(candidate))
    }

    pub fn name_for(&self, variable_part: &str) -> Result<String, AppError> {
        let name = apply_format(&self.format(), variable_part);
        let pattern = self.pattern()?;
        let consistent = match pattern.captures(&name) {
            None => false,
            Some(caps) if pattern.captures_len() > 1 => caps.get(1).is_some_and(|m| m.as_str() == variable_part),
            Some(_) => true,
        };
        if !consistent {
            return Err(AppError::configuration(format!(
                "pattern and format do not match for the dynamic field `{}` (built `{}`)",
                self.base, name
            )));
        }
        Ok(name)
    }

    pub fn extract_variable_part(&self, name: &str) -> Result<String, AppError> {
        let pattern = self.pattern()?;
        if pattern.captures_len() < 2 {
            return Err(AppError::configuration(format!(
                "pattern `{}` of the dynamic field `{}` has no capture group for the variable part",
                pattern.as_str(),
                self.base
            )));
        }
        pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AppError::NoSuchField(format!("`{}` is not a variant of `{}`", name, self.base)))
    }
}

fn apply_format(format: &str, variable_part: &str) -> String {
    let mut out = String::with_capacity(format.len() + variable_part.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                out.push_str(variable_part);
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}
