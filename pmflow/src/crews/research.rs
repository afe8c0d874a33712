//! Research crew: decide how much research a project needs, then produce the
//! foundation document the planners work from.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::core::research::{ResearchAssessment, ResearchDecision, heuristic_decision};
use crate::core::types::ProjectRequest;
use crate::engine::{AgentSpec, EngineContext, PipelineSpec, StageSpec, TaskSpec, run_pipeline};
use crate::io::schema::JsonContract;

pub const ASSESSMENT_TASK: &str = "evaluate_research_needs";
pub const INDUSTRY_TASK: &str = "industry_research";
pub const ANALYSIS_TASK: &str = "project_analysis";
pub const TEAM_TASK: &str = "team_assessment";
pub const SYNTHESIS_TASK: &str = "research_synthesis";

const WEB_SEARCH: &str = "web_search";

/// What the research phase hands to planning.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOutcome {
    pub decision: ResearchDecision,
    /// Present when the coordinator agent made the decision.
    pub assessment: Option<ResearchAssessment>,
    /// Synthesized project foundation document.
    pub foundation: String,
}

fn coordinator() -> AgentSpec {
    AgentSpec::new(
        "Research Coordinator",
        "Decide whether the project description is complete enough to plan from, \
         and which topics need research if it is not",
        "You have triaged hundreds of project briefs. You avoid research that \
         the brief already answers and you name concrete gaps.",
    )
}

fn industry_analyst(search: bool) -> AgentSpec {
    let agent = AgentSpec::new(
        "Industry Research Analyst",
        "Research the industry context that matters for delivering this project",
        "You are a market analyst who keeps research focused on what changes \
         engineering decisions.",
    );
    if search { agent.with_tools(&[WEB_SEARCH]) } else { agent }
}

fn project_analyst(search: bool) -> AgentSpec {
    let agent = AgentSpec::new(
        "Project Analyst",
        "Turn the project description into deliverables, architecture, risks and dependencies",
        "You are a senior technical lead who has scoped many software projects.",
    );
    if search { agent.with_tools(&[WEB_SEARCH]) } else { agent }
}

fn team_analyst(search: bool) -> AgentSpec {
    let agent = AgentSpec::new(
        "Team Capability Analyst",
        "Match the team's skills to the project requirements and identify gaps",
        "You are an engineering manager who staffs delivery teams.",
    );
    if search { agent.with_tools(&[WEB_SEARCH]) } else { agent }
}

fn synthesizer() -> AgentSpec {
    AgentSpec::new(
        "Research Synthesizer",
        "Combine every finding into a single project foundation document",
        "You write the documents project kick-offs are run from.",
    )
}

/// One-task pipeline run by the coordinator agent.
pub fn assessment_pipeline() -> PipelineSpec {
    PipelineSpec::new(
        "research_assessment",
        vec![StageSpec::new(
            "assess",
            vec![
                TaskSpec::new(
                    ASSESSMENT_TASK,
                    coordinator(),
                    ASSESSMENT_TASK,
                    "A research assessment JSON object",
                )
                .json(JsonContract::research_assessment()),
            ],
        )],
    )
}

/// Research pipeline shaped by `decision`.
///
/// The investigate stage exists only when research runs. Agents get the web
/// search tool when `web_search_available`.
pub fn research_pipeline(decision: &ResearchDecision, web_search_available: bool) -> PipelineSpec {
    let search = web_search_available && decision.runs_research();
    let mut stages = Vec::new();

    let analysis_context: &[&str] = if decision.runs_research() {
        stages.push(StageSpec::new(
            "investigate",
            vec![TaskSpec::new(
                INDUSTRY_TASK,
                industry_analyst(search),
                INDUSTRY_TASK,
                "Industry research findings",
            )],
        ));
        &[INDUSTRY_TASK]
    } else {
        &[]
    };

    let mut analyze = StageSpec::new(
        "analyze",
        vec![
            TaskSpec::new(
                ANALYSIS_TASK,
                project_analyst(search),
                ANALYSIS_TASK,
                "Project analysis starting with PROJECT ANALYSIS",
            )
            .with_context(analysis_context),
            TaskSpec::new(
                TEAM_TASK,
                team_analyst(search),
                TEAM_TASK,
                "Team assessment starting with TEAM ASSESSMENT",
            )
            .with_context(&[ANALYSIS_TASK]),
        ],
    );
    if decision.runs_research() {
        analyze = analyze.after(&["investigate"]);
    }
    stages.push(analyze);

    let mut synthesis_context = analysis_context.to_vec();
    synthesis_context.extend([ANALYSIS_TASK, TEAM_TASK]);
    stages.push(
        StageSpec::new(
            "synthesize",
            vec![
                TaskSpec::new(
                    SYNTHESIS_TASK,
                    synthesizer(),
                    SYNTHESIS_TASK,
                    "Project foundation document",
                )
                .with_context(&synthesis_context),
            ],
        )
        .after(&["analyze"]),
    );

    PipelineSpec::new("research", stages)
}

/// Prompt inputs shared by every research task.
pub fn research_inputs(
    request: &ProjectRequest,
    decision: &ResearchDecision,
    assessment: Option<&ResearchAssessment>,
) -> Value {
    let assessment_text = match assessment {
        Some(assessment) => serde_json::to_string_pretty(assessment).unwrap_or_default(),
        None => format!(
            "No coordinator assessment; research level '{}' chosen from the description length.",
            decision.level()
        ),
    };
    json!({
        "project_name": request.name,
        "project_description": request.description,
        "industry": request.industry,
        "team_members": request.team_members,
        "project_timeline": request.timeline_text(),
        "research_level": decision.level(),
        "research_topics": decision.topics(),
        "research_assessment": assessment_text,
    })
}

/// Decide the research level, with the coordinator agent or the heuristic.
#[instrument(skip_all, fields(project = %request.name))]
pub async fn assess(
    ctx: &EngineContext,
    request: &ProjectRequest,
    use_coordinator: bool,
) -> Result<(ResearchDecision, Option<ResearchAssessment>)> {
    if !use_coordinator {
        let decision = heuristic_decision(request);
        info!(level = decision.level(), "research level from heuristic");
        return Ok((decision, None));
    }
    let inputs = json!({
        "project_name": request.name,
        "project_description": request.description,
        "industry": request.industry,
        "team_members": request.team_members,
    });
    let run = run_pipeline(ctx, &assessment_pipeline(), &inputs)
        .await
        .context("research assessment")?;
    let assessment: ResearchAssessment = run.parsed(ASSESSMENT_TASK)?;
    let decision = ResearchDecision::from_assessment(&assessment);
    info!(level = decision.level(), topics = decision.topics().len(), "research level decided");
    Ok((decision, Some(assessment)))
}

/// Run the whole research phase.
#[instrument(skip_all, fields(project = %request.name))]
pub async fn run_research(
    ctx: &EngineContext,
    request: &ProjectRequest,
    use_coordinator: bool,
) -> Result<ResearchOutcome> {
    let (decision, assessment) = assess(ctx, request, use_coordinator).await?;
    let spec = research_pipeline(&decision, ctx.toolbox.has(WEB_SEARCH));
    let inputs = research_inputs(request, &decision, assessment.as_ref());
    let run = run_pipeline(ctx, &spec, &inputs)
        .await
        .context("research pipeline")?;
    let foundation = run
        .raw(SYNTHESIS_TASK)
        .context("research pipeline produced no foundation document")?
        .to_string();
    Ok(ResearchOutcome {
        decision,
        assessment,
        foundation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::engine::AgentLimits;
    use crate::io::llm::ChatResponse;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::{ScriptedModel, sample_request};
    use crate::tools::Toolbox;

    fn engine(model: Arc<ScriptedModel>) -> EngineContext {
        EngineContext {
            model,
            toolbox: Toolbox::new(),
            prompts: Arc::new(PromptEngine::new()),
            limits: AgentLimits {
                max_steps: 3,
                timeout: Duration::from_secs(5),
            },
        }
    }

    fn task_ids(spec: &PipelineSpec) -> Vec<&str> {
        spec.stages
            .iter()
            .flat_map(|stage| &stage.tasks)
            .map(|task| task.id.as_str())
            .collect()
    }

    #[test]
    fn skipped_research_drops_investigate_stage() {
        let spec = research_pipeline(&ResearchDecision::Skip, true);
        assert_eq!(task_ids(&spec), [ANALYSIS_TASK, TEAM_TASK, SYNTHESIS_TASK]);
        assert!(spec.stages[0].depends_on.is_empty());
        assert!(spec.stages[0].tasks[0].agent.tools.is_empty());
    }

    #[test]
    fn full_research_runs_every_stage_with_search() {
        let spec = research_pipeline(&ResearchDecision::Full, true);
        assert_eq!(
            task_ids(&spec),
            [INDUSTRY_TASK, ANALYSIS_TASK, TEAM_TASK, SYNTHESIS_TASK]
        );
        assert_eq!(spec.stages[0].tasks[0].agent.tools, [WEB_SEARCH]);
        assert_eq!(spec.stages[1].depends_on, ["investigate"]);
        assert_eq!(spec.stages[2].tasks[0].context.len(), 3);

        let offline = research_pipeline(&ResearchDecision::Full, false);
        assert!(offline.stages[0].tasks[0].agent.tools.is_empty());
    }

    #[test]
    fn inputs_carry_decision_and_team() {
        let decision = ResearchDecision::Limited {
            topics: vec!["PCI DSS".to_string()],
        };
        let inputs = research_inputs(&sample_request(), &decision, None);
        assert_eq!(inputs["research_level"], "limited");
        assert_eq!(inputs["research_topics"][0], "PCI DSS");
        assert_eq!(inputs["team_members"][0]["email"], "ada@example.com");
        assert!(
            inputs["research_assessment"]
                .as_str()
                .unwrap_or_default()
                .contains("description length")
        );
    }

    #[tokio::test]
    async fn heuristic_skips_the_coordinator() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let (decision, assessment) = assess(&engine(model.clone()), &sample_request(), false)
            .await
            .expect("assess");
        assert_eq!(decision, ResearchDecision::Full);
        assert!(assessment.is_none());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn coordinator_none_skips_industry_research() {
        let model = Arc::new(ScriptedModel::new(vec![
            ChatResponse::text(
                r#"{"research_recommendation": "none", "reasoning": "complete brief",
                    "information_gaps": [], "research_topics": []}"#,
            ),
            ChatResponse::text("PROJECT ANALYSIS ..."),
            ChatResponse::text("TEAM ASSESSMENT ..."),
            ChatResponse::text("## EXECUTIVE SUMMARY ..."),
        ]));

        let outcome = run_research(&engine(model.clone()), &sample_request(), true)
            .await
            .expect("research");

        assert_eq!(outcome.decision, ResearchDecision::Skip);
        assert_eq!(outcome.foundation, "## EXECUTIVE SUMMARY ...");
        assert_eq!(model.requests().len(), 4);
        assert_eq!(model.remaining(), 0);
        let analysis_prompt = model.requests()[1].messages[1]
            .content
            .clone()
            .unwrap_or_default();
        assert!(analysis_prompt.contains("Industry research was skipped"));
    }

    #[tokio::test]
    async fn invalid_assessment_fails_the_phase() {
        let model = Arc::new(ScriptedModel::new(vec![ChatResponse::text(
            r#"{"research_recommendation": "maybe", "reasoning": "x",
                "information_gaps": [], "research_topics": []}"#,
        )]));
        let err = run_research(&engine(model), &sample_request(), true)
            .await
            .expect_err("schema violation");
        assert!(format!("{err:#}").contains("research assessment"));
    }
}
