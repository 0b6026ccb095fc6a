//! Compiled document templates.

use crate::attachments::AttachmentMode;
use crate::conditional::ConditionalEvaluator;
use crate::context::GenerationContext;
use crate::document::Document;
use crate::error::TemplateError;
use crate::resolve::resolve;
use crate::token::{tokenize, Segment};
use rand::Rng;
use serde_json::Value;
use std::path::Path;

/// A template tokenized once and rendered for every document id.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTemplate {
    segments: Vec<Segment>,
}

impl DocumentTemplate {
    /// Parse template text.
    ///
    /// Lines starting with `#` and whitespace-only lines are comments; the
    /// remaining lines are concatenated, newlines included.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let body: String = text
            .split_inclusive('\n')
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .collect();
        if body.is_empty() {
            return Err(TemplateError::EmptyTemplate);
        }
        Ok(Self {
            segments: tokenize(&body)?,
        })
    }

    /// Read and parse a template file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::TemplateFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve every placeholder and parse the result as JSON.
    pub fn compile(&self, ctx: &GenerationContext<'_>) -> Result<Value, TemplateError> {
        self.compile_with(ctx, &mut rand::rng())
    }

    pub fn compile_with<R: Rng + ?Sized>(
        &self,
        ctx: &GenerationContext<'_>,
        rng: &mut R,
    ) -> Result<Value, TemplateError> {
        let text = resolve(&self.segments, ctx, rng)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Render one document: compile, prune conditional keys, then split off
    /// attachments.
    pub fn render(
        &self,
        ctx: &GenerationContext<'_>,
        mode: AttachmentMode,
    ) -> Result<Document, TemplateError> {
        self.render_with(ctx, mode, &mut rand::rng())
    }

    pub fn render_with<R: Rng + ?Sized>(
        &self,
        ctx: &GenerationContext<'_>,
        mode: AttachmentMode,
        rng: &mut R,
    ) -> Result<Document, TemplateError> {
        let value = self.compile_with(ctx, rng)?;
        let value = ConditionalEvaluator::new(ctx).evaluate(value)?;
        Document::from_value(value, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AttachmentPayload;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_render_end_to_end() {
        let template = DocumentTemplate::parse(
            r##"{"_id": "#{doc_id_counter}", "n": #{random_int(1, 1)}, "db": "#{db_prefix}"}"##,
        )
        .unwrap();
        let ctx = GenerationContext::new(7, "testdb", "user");
        let doc = template.render(&ctx, AttachmentMode::Lazy).unwrap();
        assert_eq!(doc.id, "7");
        assert_eq!(Value::Object(doc.fields), json!({"n": 1, "db": "testdb"}));
    }

    #[test]
    fn test_comment_and_blank_lines_stripped() {
        let text = "# a comment\n{\n\n   \n  \"a\": 1\n# another\n}\n";
        let template = DocumentTemplate::parse(text).unwrap();
        assert_eq!(
            template.segments(),
            &[Segment::Literal("{\n  \"a\": 1\n}\n".to_string())]
        );
    }

    #[test]
    fn test_empty_template() {
        assert!(matches!(
            DocumentTemplate::parse("# only comments\n\n"),
            Err(TemplateError::EmptyTemplate)
        ));
    }

    #[test]
    fn test_invalid_json_after_resolution() {
        let template = DocumentTemplate::parse(r#"{"a": #{random_string(3)}}"#).unwrap();
        let ctx = GenerationContext::new(1, "db", "user");
        assert!(matches!(
            template.compile(&ctx),
            Err(TemplateError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_conditionals_applied_during_render() {
        let template = DocumentTemplate::parse(
            r##"{"_id": "#{doc_id_counter}", "#{if(doc_id_counter % 2 == 0)}even": true}"##,
        )
        .unwrap();
        let odd = template
            .render(&GenerationContext::new(3, "db", "user"), AttachmentMode::Lazy)
            .unwrap();
        let even = template
            .render(&GenerationContext::new(4, "db", "user"), AttachmentMode::Lazy)
            .unwrap();
        assert!(odd.fields.is_empty());
        assert_eq!(even.fields["even"], true);
    }

    #[test]
    fn test_from_file_with_file_attachment() {
        let mut payload = tempfile::NamedTempFile::new().unwrap();
        payload.write_all(b"payload").unwrap();
        let mut tpl = tempfile::NamedTempFile::new().unwrap();
        write!(
            tpl,
            "# doc template\n{{\"_id\": \"d#{{doc_id_counter}}\",\n\"_attachments\": {{\"p\": {{\"data\": \"#{{file({})}}\"}}}}}}\n",
            payload.path().display()
        )
        .unwrap();

        let template = DocumentTemplate::from_file(tpl.path()).unwrap();
        let ctx = GenerationContext::new(1, "db", "user");
        let doc = template.render(&ctx, AttachmentMode::Lazy).unwrap();
        assert_eq!(doc.id, "d1");
        assert_eq!(
            doc.attachments[0].payload,
            AttachmentPayload::FileReference(payload.path().to_path_buf())
        );
    }

    #[test]
    fn test_nested_placeholders_in_call_arguments() {
        let template = DocumentTemplate::parse(
            r##"{"_id": "#{doc_id_counter}", "v": "#{pick(#{doc_id_counter},#{doc_id_counter})}", "n": #{random_int(#{doc_id_counter},#{doc_id_counter})}, "db": "#{pick(#{db_prefix})}"}"##,
        )
        .unwrap();
        let ctx = GenerationContext::new(7, "testdb", "user");
        let value = template.compile(&ctx).unwrap();
        assert_eq!(
            value,
            json!({"_id": "7", "v": "7", "n": 7, "db": "testdb"})
        );
    }

    #[test]
    fn test_missing_file() {
        let result = DocumentTemplate::from_file("/definitely/not/here.tpl");
        assert!(matches!(result, Err(TemplateError::TemplateFile { .. })));
    }
}
