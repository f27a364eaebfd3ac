//! Command templates with `<%= field %>` interpolation.
//!
//! Only a fixed set of fields can be referenced; there is no expression
//! evaluation. `<%%` produces a literal `<%`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::file::File;

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed `<%=` tag at byte {0}")]
    Unclosed(usize),
    #[error("only `<%= field %>` tags are supported (at byte {0}); write `<%%` for a literal `<%`")]
    UnsupportedTag(usize),
    #[error("empty `<%= %>` tag at byte {0}")]
    EmptyTag(usize),
    #[error("unknown template field `{0}`")]
    UnknownField(String),
    #[error("template field `{0}` needs a file, but the command is not running on one")]
    NoFile(String),
    #[error("template field `data.{0}` is not defined")]
    MissingData(String),
}

/// Per-file fields available as `file.<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileField {
    Path,
    Base,
    Cwd,
    Relative,
    Basename,
    Stem,
    Extname,
    Dirname,
}

impl FileField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "path" => FileField::Path,
            "base" => FileField::Base,
            "cwd" => FileField::Cwd,
            "relative" => FileField::Relative,
            "basename" => FileField::Basename,
            "stem" => FileField::Stem,
            "extname" => FileField::Extname,
            "dirname" => FileField::Dirname,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            FileField::Path => "path",
            FileField::Base => "base",
            FileField::Cwd => "cwd",
            FileField::Relative => "relative",
            FileField::Basename => "basename",
            FileField::Stem => "stem",
            FileField::Extname => "extname",
            FileField::Dirname => "dirname",
        }
    }

    fn value(self, file: &File) -> String {
        match self {
            FileField::Path => file.path.display().to_string(),
            FileField::Base => file.base.display().to_string(),
            FileField::Cwd => file.cwd.display().to_string(),
            FileField::Relative => file.relative().display().to_string(),
            FileField::Basename => file.basename().to_string(),
            FileField::Stem => file.stem().to_string(),
            FileField::Extname => file.extname(),
            FileField::Dirname => file.dirname().display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Lit(String),
    File(FileField),
    Data(String),
}

/// A parsed command template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template(pub Vec<Segment>);

/// Data a template is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub file: Option<&'a File>,
    pub data: &'a BTreeMap<String, String>,
}

impl<'a> Context<'a> {
    pub fn new(data: &'a BTreeMap<String, String>) -> Self {
        Self { file: None, data }
    }

    pub fn with_file(mut self, file: &'a File) -> Self {
        self.file = Some(file);
        self
    }
}

impl Template {
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let mut segs = Vec::new();
        let mut lit = String::new();
        let mut rest = input;

        while let Some(start) = rest.find(OPEN) {
            let offset = input.len() - rest.len() + start;
            lit.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];

            if let Some(tail) = after.strip_prefix('%') {
                lit.push_str(OPEN);
                rest = tail;
                continue;
            }
            let Some(body) = after.strip_prefix('=') else {
                return Err(TemplateError::UnsupportedTag(offset));
            };
            let end = body.find(CLOSE).ok_or(TemplateError::Unclosed(offset))?;
            let field = body[..end].trim();
            if field.is_empty() {
                return Err(TemplateError::EmptyTag(offset));
            }

            if !lit.is_empty() {
                segs.push(Segment::Lit(std::mem::take(&mut lit)));
            }
            segs.push(parse_field(field)?);
            rest = &body[end + CLOSE.len()..];
        }

        lit.push_str(rest);
        if !lit.is_empty() {
            segs.push(Segment::Lit(lit));
        }
        Ok(Template(segs))
    }

    pub fn render(&self, ctx: &Context<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for seg in &self.0 {
            match seg {
                Segment::Lit(s) => out.push_str(s),
                Segment::File(field) => {
                    let file = ctx
                        .file
                        .ok_or_else(|| TemplateError::NoFile(format!("file.{}", field.name())))?;
                    out.push_str(&field.value(file));
                }
                Segment::Data(key) => {
                    let value = ctx
                        .data
                        .get(key)
                        .ok_or_else(|| TemplateError::MissingData(key.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn parse_field(field: &str) -> Result<Segment, TemplateError> {
    let unknown = || TemplateError::UnknownField(field.to_string());
    let (scope, name) = field.split_once('.').ok_or_else(unknown)?;
    match scope {
        "file" => FileField::parse(name).map(Segment::File).ok_or_else(unknown),
        "data" if is_key(name) => Ok(Segment::Data(name.to_string())),
        _ => Err(unknown()),
    }
}

fn is_key(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, file: Option<&File>) -> Result<String, TemplateError> {
        let data = BTreeMap::from([("target".to_string(), "release".to_string())]);
        let mut ctx = Context::new(&data);
        ctx.file = file;
        Template::parse(template)?.render(&ctx)
    }

    #[test]
    fn literal_only() {
        let t = Template::parse("echo hello").unwrap();
        assert_eq!(t.0, vec![Segment::Lit("echo hello".into())]);
    }

    #[test]
    fn substitutes_file_path() {
        let file = File::new("/a/b.txt", "");
        assert_eq!(render("echo <%= file.path %>", Some(&file)).unwrap(), "echo /a/b.txt");
    }

    #[test]
    fn substitutes_several_fields() {
        let file = File::new("/src/lib/util.rs", "").with_base("/src");
        let out = render(
            "cp <%=file.relative%> out/<%= file.stem %><%= file.extname %> --<%= data.target %>",
            Some(&file),
        )
        .unwrap();
        assert_eq!(out, "cp lib/util.rs out/util.rs --release");
    }

    #[test]
    fn literal_percent_escape() {
        assert_eq!(render("echo '<%%= x %>'", None).unwrap(), "echo '<%= x %>'");
    }

    #[test]
    fn unclosed_tag_errors() {
        assert_eq!(Template::parse("echo <%= file.path"), Err(TemplateError::Unclosed(5)));
    }

    #[test]
    fn code_tags_are_rejected() {
        assert_eq!(Template::parse("<% rm %>"), Err(TemplateError::UnsupportedTag(0)));
    }

    #[test]
    fn unknown_field_errors() {
        let err = Template::parse("echo <%= file.contents %>").unwrap_err();
        assert_eq!(err, TemplateError::UnknownField("file.contents".into()));
        let err = Template::parse("echo <%= process.exit() %>").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownField(_)));
    }

    #[test]
    fn file_field_without_file_errors() {
        let err = render("echo <%= file.path %>", None).unwrap_err();
        assert_eq!(err, TemplateError::NoFile("file.path".into()));
    }

    #[test]
    fn missing_data_key_errors() {
        let err = render("echo <%= data.nope %>", None).unwrap_err();
        assert_eq!(err, TemplateError::MissingData("nope".into()));
    }
}
