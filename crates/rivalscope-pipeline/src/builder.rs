//! PipelineBuilder: target + depth → ordered work units
//!
//! Layers, in order:
//!
//! ```text
//! research ──┬── gap_moat_analysis   (standard, comprehensive)
//!            ├── deep_dive           (comprehensive)
//!            ├── visual_analysis     (visual pass requested)
//!            └────────────────────── synthesis (depends on every unit above)
//! ```

use crate::pipeline::Pipeline;
use rivalscope_core::{contracts, Capability, Depth, Error, Result, WorkUnit};

/// Well-known unit ids.
pub mod units {
    pub const RESEARCH: &str = "research";
    pub const GAP_MOAT_ANALYSIS: &str = "gap_moat_analysis";
    pub const DEEP_DIVE: &str = "deep_dive";
    pub const VISUAL_ANALYSIS: &str = "visual_analysis";
    pub const SYNTHESIS: &str = "synthesis";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, target: &str, depth: Depth, wants_visual_pass: bool) -> Result<Pipeline> {
        let target = target.trim();
        if target.is_empty() {
            return Err(Error::configuration(
                "malformed pipeline request: target must not be blank",
            ));
        }

        let mut plan = vec![WorkUnit::new(
            units::RESEARCH,
            target,
            Capability::Research,
            format!(
                "Research {target}: product offering, pricing, positioning, customers and recent \
                 announcements. Record the source of every fact."
            ),
        )
        .with_contract(contracts::RESEARCH_BRIEF)];

        if depth != Depth::Quick {
            plan.push(
                WorkUnit::new(
                    units::GAP_MOAT_ANALYSIS,
                    target,
                    Capability::Analysis,
                    format!(
                        "Using the research brief, identify feature gaps between {target} and the \
                         market, and the moats that protect {target} from competition."
                    ),
                )
                .after([units::RESEARCH])
                .with_contract(contracts::ANALYSIS_FINDINGS),
            );
        }

        if depth == Depth::Comprehensive {
            plan.push(
                WorkUnit::new(
                    units::DEEP_DIVE,
                    target,
                    Capability::Analysis,
                    format!(
                        "Deep dive on {target}: business model, unit economics, hiring signals, \
                         partnerships and strategic risks."
                    ),
                )
                .after([units::RESEARCH])
                .with_contract(contracts::ANALYSIS_FINDINGS),
            );
        }

        if wants_visual_pass {
            plan.push(
                WorkUnit::new(
                    units::VISUAL_ANALYSIS,
                    target,
                    Capability::Analysis,
                    format!(
                        "Review the public visual presence of {target} (site, product screenshots, \
                         brand) and describe how it positions the product."
                    ),
                )
                .after([units::RESEARCH])
                .with_contract(contracts::ANALYSIS_FINDINGS),
            );
        }

        let prior: Vec<String> = plan.iter().map(|u| u.id.clone()).collect();
        plan.push(
            WorkUnit::new(
                units::SYNTHESIS,
                target,
                Capability::Synthesis,
                format!(
                    "Combine every prior finding into one competitive assessment of {target} with \
                     a confidence score between 0 and 1."
                ),
            )
            .after(prior)
            .with_contract(contracts::TARGET_REPORT),
        );

        Ok(Pipeline::new(target, plan))
    }
}
