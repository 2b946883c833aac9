//! Prompt text for the three engines.
//!
//! Every prompt asks for replies in the `FILE: <name>` + fenced block
//! format understood by [`super::response::parse_file_blocks`].

use super::engines::{RemediationRequest, SourceFile, TestGenerationRequest};

const REMEDIATION_ROLE: &str = "You are a senior Python refactoring agent. \
You rewrite code to fix logic failures and improve quality. \
Reply with code only, no explanations.";

const TEST_GENERATION_ROLE: &str = "You are a QA engineer specialized in pytest. \
Write unit tests for the provided Python code to check its correctness.";

const FEEDBACK_ROLE: &str = "You are a senior debugger. A 100% test pass rate is required. \
Explain exactly what broke so the code can be fixed in the next pass.";

fn source_section(files: &[SourceFile]) -> String {
    files
        .iter()
        .map(|f| format!("FILE: {}\n```python\n{}\n```", f.name, f.content.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn or_none<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    if text.trim().is_empty() {
        fallback
    } else {
        text
    }
}

/// Prompt for one remediation step.
#[must_use]
pub fn remediation_prompt(request: &RemediationRequest) -> String {
    let in_batch: Vec<String> = request
        .files
        .iter()
        .map(|f| crate::graph::file_name(&f.path))
        .collect();

    format!(
        "{role}\n\n\
--- STYLE ISSUES ---\n{style}\n\n\
--- LOGIC FAILURES ---\n{logic}\n\n\
--- PROJECT SIGNATURES (other files, read-only) ---\n{context}\n\n\
--- SOURCE CODE ---\n{sources}\n\n\
INSTRUCTIONS:\n\
1. Fix logic failures first so the code is functional.\n\
2. Follow the style feedback and add missing documentation.\n\
3. Keep function names, parameters and return types unchanged.\n\
4. Keep imports between these files; do not merge modules.\n\
5. Return the FULL content of every file as `FILE: <name>` followed by a ```python block.\n",
        role = REMEDIATION_ROLE,
        style = or_none(&request.style_diagnostics, "None."),
        logic = or_none(&request.verification_diagnostics, "None. Focus on quality."),
        context = or_none(&request.context.render_excluding(&in_batch), "None."),
        sources = source_section(&request.files),
    )
}

/// Prompt asking for one test file per target.
#[must_use]
pub fn test_generation_prompt(request: &TestGenerationRequest) -> String {
    let module_hints: Vec<String> = request
        .files
        .iter()
        .zip(&request.targets)
        .map(|(f, t)| {
            let module = f
                .name
                .trim_end_matches(".py")
                .replace(['/', '\\'], ".");
            format!("- {} tests `{}` (import with `from {} import *`)", t, f.name, module)
        })
        .collect();

    format!(
        "{role}\n\n\
--- SOURCE CODE ---\n{sources}\n\n\
--- AVAILABLE SIGNATURES ---\n{context}\n\n\
TEST FILES TO WRITE:\n{targets}\n\n\
INSTRUCTIONS:\n\
1. Write focused unit tests for the core behaviour; each test must run in isolation.\n\
2. Use pytest.approx for floating point comparisons.\n\
3. When patching, patch where a name is imported, not where it is defined.\n\
4. Only use functions, methods and attributes that exist in the code above.\n\
5. Return each test file as `FILE: <name>` followed by a ```python block.\n",
        role = TEST_GENERATION_ROLE,
        sources = source_section(&request.files),
        context = or_none(&request.context.render(), "None."),
        targets = module_hints.join("\n"),
    )
}

/// Prompt turning raw pytest output into per-file fix bullets.
#[must_use]
pub fn feedback_prompt(failure_output: &str, files: &[String]) -> String {
    format!(
        "{role}\n\n\
The unit tests failed for: {files}\n\n\
--- RAW PYTEST OUTPUT ---\n{output}\n\n\
TASK:\n\
1. Analyze the traceback.\n\
2. Summarize the exact logic errors in plain English.\n\
3. Ignore environment warnings; focus on assertion errors and logic bugs.\n\
4. Give a bullet list of what must change, grouped by file name.\n\
5. For mutually importing files, keep the imports as they are.\n",
        role = FEEDBACK_ROLE,
        files = files.join(" | "),
        output = failure_output.trim(),
    )
}
