use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::flows::spec::{check_filled, FinalizeError, FinalizeResult, Flow, Validation};
use crate::session::SessionMeta;
use crate::slots::{Filled, IntBounds, ParserHint, SlotSpec, SlotType, UiHints};

pub const BULLET_SUMMARY: &str = "bullet_summary";

const MIN_HIGHLIGHTS: i64 = 3;
const HIGHLIGHTS_PER_DOC: i64 = 5;
const HIGHLIGHT_FLOOR: i64 = 5;
const HIGHLIGHT_CEILING: i64 = 25;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletContext {
    pub doc_count: i64,
    pub min_highlights: i64,
    pub max_highlights: i64,
}

impl BulletContext {
    fn highlight_bounds(&self) -> IntBounds {
        IntBounds::new(self.min_highlights, self.max_highlights)
    }
}

/// Highlights summary of the session's documents. The summarizer behind it
/// does not exist yet, so finalize answers 501.
pub struct BulletSummaryFlow {
    slots: Vec<SlotSpec<BulletContext>>,
}

impl Default for BulletSummaryFlow {
    fn default() -> Self {
        Self {
            slots: vec![
                SlotSpec::new("highlight_count", SlotType::BoundedInt, |ctx: &BulletContext| {
                    format!(
                        "How many highlights should the summary have? Pick between {} and {}.",
                        ctx.min_highlights, ctx.max_highlights
                    )
                })
                .with_bounds(BulletContext::highlight_bounds)
                .with_hint(ParserHint::Count)
                .with_ui(|ctx| {
                    UiHints::quick([ctx.min_highlights, ctx.max_highlights].map(|n| n.to_string()))
                }),
                SlotSpec::new("include_citations", SlotType::Boolean, |_: &BulletContext| {
                    "Should each highlight cite the document it came from?".to_string()
                })
                .with_ui(|_| UiHints::quick(["Yes", "No"])),
            ],
        }
    }
}

#[async_trait]
impl Flow for BulletSummaryFlow {
    type Context = BulletContext;

    fn id(&self) -> &'static str {
        BULLET_SUMMARY
    }

    fn slots(&self) -> &[SlotSpec<BulletContext>] {
        &self.slots
    }

    async fn init(&self, meta: &SessionMeta) -> BulletContext {
        let doc_count = meta.doc_ids.len().max(1) as i64;
        BulletContext {
            doc_count,
            min_highlights: MIN_HIGHLIGHTS,
            max_highlights: (HIGHLIGHTS_PER_DOC * doc_count)
                .clamp(HIGHLIGHT_FLOOR, HIGHLIGHT_CEILING),
        }
    }

    async fn validate(&self, filled: &Filled, ctx: &BulletContext) -> Validation {
        let errors = check_filled(&self.slots, filled, ctx);
        if errors.is_empty() {
            Validation::accept(filled.clone())
        } else {
            Validation::reject(errors, filled.clone())
        }
    }

    async fn finalize(
        &self,
        filled: &Filled,
        _ctx: &BulletContext,
    ) -> Result<FinalizeResult, FinalizeError> {
        Ok(FinalizeResult {
            status: 501,
            body: json!({
                "error": "not_implemented",
                "message": "Bullet summaries are not available yet.",
                "flow": BULLET_SUMMARY,
                "highlightCount": filled.get("highlight_count"),
                "includeCitations": filled.get("include_citations"),
            }),
        })
    }

    fn redirect_message(&self, _ctx: &BulletContext) -> String {
        "Let's finish setting up your summary first.".to_string()
    }

    fn start_fields(&self, ctx: &BulletContext) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("maxHighlights".to_string(), json!(ctx.max_highlights));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::BulletSummaryFlow;
    use crate::flows::spec::Flow;
    use crate::session::SessionMeta;
    use crate::slots::{Filled, SlotValue};

    fn meta(docs: usize) -> SessionMeta {
        SessionMeta {
            session_id: "s-1".to_string(),
            doc_ids: (0..docs).map(|n| format!("doc-{n}")).collect(),
            ..SessionMeta::default()
        }
    }

    #[tokio::test]
    async fn highlight_ceiling_scales_with_documents() {
        let flow = BulletSummaryFlow::default();
        assert_eq!(flow.init(&meta(0)).await.max_highlights, 5);
        assert_eq!(flow.init(&meta(3)).await.max_highlights, 15);
        assert_eq!(flow.init(&meta(9)).await.max_highlights, 25);
    }

    #[tokio::test]
    async fn validate_requires_both_slots() {
        let flow = BulletSummaryFlow::default();
        let ctx = flow.init(&meta(2)).await;

        let mut filled = Filled::new();
        filled.insert("highlight_count".into(), SlotValue::Integer(4));
        let rejected = flow.validate(&filled, &ctx).await;
        assert!(!rejected.ok);
        assert_eq!(rejected.errors, vec!["Missing a value for `include_citations`.".to_string()]);

        filled.insert("include_citations".into(), SlotValue::Flag(true));
        assert!(flow.validate(&filled, &ctx).await.ok);
    }

    #[tokio::test]
    async fn finalize_is_not_implemented() {
        let flow = BulletSummaryFlow::default();
        let ctx = flow.init(&meta(1)).await;
        let result = flow.finalize(&Filled::new(), &ctx).await.expect("fixed payload");
        assert_eq!(result.status, 501);
        assert_eq!(result.body["error"], "not_implemented");
    }
}
