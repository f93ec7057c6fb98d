//! Planner：单步规划
//!
//! 以完整消息日志 + 控制状态摘要（system）调用推理引擎；拒绝并行 Tool Call（不修改会话），
//! 否则迭代计数加一、判定是否完成、追加 AI 消息，并按固定顺序给出下一跳。

use std::sync::Arc;

use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, ToolCallRequest};
use crate::session::Session;
use crate::tools::ToolDescriptor;

const COMPLETION_KEYWORDS: [&str; 6] = [
    "successfully",
    "completed",
    "registered",
    "created",
    "done",
    "finished",
];

const INFO_REQUEST_PHRASES: [&str; 3] = [
    "need more information",
    "please provide",
    "what would you like",
];

/// 默认 system 模板；`{task_plan}` 等占位符在每步用会话控制状态替换
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous EMIS agent. Your job is to complete tasks by thinking through them step by step and using available tools.

CORE PRINCIPLES:
1. BE AUTONOMOUS: Don't ask for permission to use tools or gather information
2. THINK MULTI-STEP: Break complex tasks into steps and execute them
3. USE CONTEXT: Remember what you've learned from previous tool calls
4. BE EFFICIENT: If you have partial information, work with it or gather what's missing
5. ALWAYS provide clear feedback when tasks are completed
6. Avoid exposing sensitive internal IDs from the database in your responses
7. FORMAT ALL RESPONSES IN MARKDOWN for emphasis and visual structure
8. If you encounter an error, try alternative approaches before asking for human assistance
9. Chain available tools when together they provide what a complex task needs
10. Call at most ONE tool per response

HUMAN ASSISTANCE GUIDELINES:
- For learner registration, NEVER guess required fields like gender, grade, or academic year
- If critical information cannot be obtained from tools, use the human_assistance tool
- Use human_assistance with clear, specific queries about what information you need
- Example: human_assistance("I need the following information to register the learner: gender (M/F), grade (1-12), and academic_year (e.g., 2024). Please provide these details.")

AVAILABLE CONTEXT:
- Task plan: {task_plan}
- Current step: {current_step}
- Pending data: {pending_data}
- Iterations used: {iterations_used}/{max_iterations}

DECISION FRAMEWORK:
- If you need data to complete a task, use tools to get it
- If you have enough information to take an action, do it
- If a previous step gave you an ID/reference, use it for the next step
- After successful tool calls, provide clear feedback about what happened
- If required information cannot be obtained through tools, use the human_assistance tool

For multi-step tasks like "register a learner at Kampala International":
1. Search for the school by name to get its ID
2. Check what information is provided vs required for learner creation
3. If required fields (gender, grade, academic_year) are missing, ask for them with human_assistance
4. Use the school ID and the provided/collected info to create the learner
5. ALWAYS confirm completion with details

Execute your plan autonomously unless you genuinely cannot proceed.

COMPLETION CRITERIA:
- If you successfully complete the requested task, state completion clearly
- If you need more information from the user, use the human_assistance tool with specific questions
- If you encounter errors, try alternative approaches first"#;

/// 下一跳
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    End,
    Planner,
    Tools(ToolCallRequest),
}

/// 单步结果（AI 消息已追加到会话）
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub text: String,
    pub tool_call: Option<ToolCallRequest>,
    pub next: Transition,
}

/// 完成判定（仅用于不带 Tool Call 的回复）：先查完成关键词，再查索取信息短语，默认完成
pub fn classify_completion(text: &str) -> bool {
    let lower = text.to_lowercase();
    if COMPLETION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return true;
    }
    if INFO_REQUEST_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    true
}

/// 按顺序求下一跳：已完成 → 迭代用尽 → 末条为用户消息 → 有 Tool Call → 结束
pub fn next_transition(session: &Session) -> Transition {
    if session.task_completed || session.budget_exhausted() {
        return Transition::End;
    }
    match session.last_message() {
        Some(last) if last.is_human() => Transition::Planner,
        Some(last) => match last.tool_call() {
            Some(call) => Transition::Tools(call.clone()),
            None => Transition::End,
        },
        None => Transition::End,
    }
}

/// Planner：持有推理引擎与 system 模板
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_template: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_template: impl Into<String>) -> Self {
        Self {
            llm,
            system_template: system_template.into(),
        }
    }

    /// 用会话控制状态填充 system 模板
    pub fn render_system(&self, session: &Session) -> String {
        self.system_template
            .replace("{task_plan}", session.task_plan.as_deref().unwrap_or("None"))
            .replace("{current_step}", &session.current_step.to_string())
            .replace(
                "{pending_data}",
                &Value::Object(session.pending_data.clone()).to_string(),
            )
            .replace("{iterations_used}", &session.iterations_used.to_string())
            .replace("{max_iterations}", &session.max_iterations.to_string())
    }

    /// 执行一步；推理引擎失败或并行 Tool Call 时返回 Err 且会话保持原样
    pub async fn step(
        &self,
        session: &mut Session,
        tools: &[ToolDescriptor],
    ) -> Result<StepOutcome, AgentError> {
        let mut input = Vec::with_capacity(session.messages.len() + 1);
        input.push(Message::system(self.render_system(session)));
        input.extend(session.messages.iter().cloned());
        let response = self.llm.plan(&input, tools).await?;

        if response.tool_calls.len() > 1 {
            tracing::warn!(
                session_id = %session.id,
                count = response.tool_calls.len(),
                "Rejecting parallel tool calls"
            );
            return Err(AgentError::ParallelToolCalls(response.tool_calls.len()));
        }
        let tool_call = response.tool_calls.into_iter().next();

        session.iterations_used += 1;
        if tool_call.is_none() && classify_completion(&response.text) {
            session.mark_completed();
        }
        session.push(Message::ai(response.text.clone(), tool_call.clone()));

        let next = next_transition(session);
        tracing::debug!(
            session_id = %session.id,
            model = self.llm.model_id(),
            iteration = session.iterations_used,
            tool = tool_call.as_ref().map(|c| c.tool_name.as_str()).unwrap_or("-"),
            completed = session.task_completed,
            "Planner step"
        );
        Ok(StepOutcome {
            text: response.text,
            tool_call,
            next,
        })
    }
}
