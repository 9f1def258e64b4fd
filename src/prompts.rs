//! Agent personas and the request templates sent to them.

use crate::character::Character;
use crate::llm::TERMINATOR;

pub const CHARACTER_MANAGER_SYSTEM: &str = "\
You are a character consistency manager who:
1. Tracks all characters and their attributes
2. Ensures character names, traits, and behaviors remain consistent
3. Flags any inconsistencies in character portrayal
4. Maintains character relationships and development arcs
5. Provides character information to other agents
Be thorough and specific in maintaining character consistency.";

pub const EDITOR_SYSTEM: &str = "\
You are a skilled book editor who:
1. Reviews story premises and provides constructive feedback
2. Ensures plot consistency and character development
3. Maintains the overall narrative structure
4. Provides detailed chapter outlines
Be constructive and specific in your feedback.";

pub const WRITER_SYSTEM: &str = "\
You are a creative writer who:
1. Transforms outlines into engaging prose
2. Creates vivid descriptions and natural dialogue
3. Maintains consistent character voices
4. Follows the established plot structure while adding creative details
5. Incorporates feedback to improve chapters
Write in a clear, engaging style without excessive description.";

pub const REVIEWER_SYSTEM: &str = "\
You are a literary critic who:
1. Reviews completed chapters for quality and consistency
2. Suggests improvements for pacing and style
3. Identifies potential plot holes or character inconsistencies
4. Ensures each chapter advances the story meaningfully
Provide specific, actionable feedback.";

pub fn character_extraction(premise: &str) -> String {
    format!(
        "Based on this premise: '{premise}'\n\
\n\
Create detailed character profiles in JSON format for each character. \
The response should be a JSON array where each character is an object with these fields:\n\
- name: string\n\
- role: string\n\
- description: string\n\
- personality: string\n\
- relationships: object mapping character names to relationship descriptions\n\
- key_traits: array of strings\n\
- first_appearance: string (chapter number)\n\
- story_arc: string\n\
\n\
Example format:\n\
```json\n\
[\n\
  {{\n\
    \"name\": \"John Doe\",\n\
    \"role\": \"Protagonist\",\n\
    \"description\": \"A tall man with brown hair...\",\n\
    \"personality\": \"Brave but reckless...\",\n\
    \"relationships\": {{\"Jane Smith\": \"Love interest\", \"Bob Johnson\": \"Best friend\"}},\n\
    \"key_traits\": [\"courageous\", \"stubborn\", \"loyal\"],\n\
    \"first_appearance\": \"1\",\n\
    \"story_arc\": \"Grows from reckless youth to responsible leader\"\n\
  }}\n\
]\n\
```\n\
\n\
Create profiles for all major and significant supporting characters.\n\
End with {TERMINATOR}"
    )
}

pub fn outline_request(premise: &str, chapter: u32, total: u32, context: &str) -> String {
    let final_note = if chapter == total {
        "This is the final chapter. Ensure a satisfying conclusion.\n\n"
    } else {
        ""
    };
    format!(
        "Based on the following premise: '{premise}'\n\
\n\
Character Context:\n\
{context}\n\
\n\
{final_note}\
Create a detailed outline for Chapter {chapter} of {total}. Include:\n\
1. A unique and descriptive chapter title\n\
2. Key plot points\n\
3. Character appearances and interactions\n\
4. Setting descriptions\n\
5. Major events or revelations\n\
\n\
Ensure all character appearances and actions align with their established profiles.\n\
The chapter's content MUST be unique compared to previous chapters.\n\
Respond in a structured format suitable for the writer to develop into prose.\n\
\n\
Start with the chapter title in the format 'Title: \"Chapter Title\"'.\n\
End with {TERMINATOR}"
    )
}

pub fn outline_retry(issues: &[String], agent_feedback: Option<&str>) -> String {
    let mut out = format!(
        "Previous outline had these issues:\n{}\n",
        issues.join(", ")
    );
    if let Some(feedback) = agent_feedback.filter(|f| !f.trim().is_empty()) {
        out.push_str(&format!("\nAgent feedback:\n{feedback}\n"));
    }
    out.push_str(&format!(
        "\nPlease generate a new outline addressing these issues.\nEnd with {TERMINATOR}"
    ));
    out
}

/// Plot and structure notes from the editor.
pub const OUTLINE_REVIEW_PLOT: &str = "Editor: please review the plot and structure.";
/// Consistency notes from the character manager.
pub const OUTLINE_REVIEW_CHARACTERS: &str =
    "Character Manager: please review character consistency and development.";

pub fn outline_review(
    outline: &str,
    chapter: u32,
    premise: &str,
    context: &str,
    focus: &str,
) -> String {
    format!(
        "Review this outline for Chapter {chapter}:\n\
\n\
{outline}\n\
\n\
Original Premise:\n\
{premise}\n\
\n\
Character Context:\n\
{context}\n\
\n\
Evaluate the outline for:\n\
1. Consistency with previous chapters and premise\n\
2. Character development and proper use\n\
3. Plot progression\n\
4. Unique story elements\n\
5. Pacing and structure\n\
\n\
{focus}\n\
Provide specific feedback and suggestions.\n\
End with {TERMINATOR}"
    )
}

pub fn chapter_draft(
    outline: &str,
    chapter: u32,
    total: u32,
    context: &str,
    feedback: Option<&str>,
    words: u32,
) -> String {
    let feedback = match feedback {
        Some(feedback) => format!("Please address this feedback in your revision:\n{feedback}\n"),
        None => String::new(),
    };
    format!(
        "Using this outline for Chapter {chapter} of {total}, write a complete chapter in engaging prose:\n\
\n\
{outline}\n\
\n\
Character Context:\n\
{context}\n\
\n\
Editor Feedback:\n\
{feedback}\n\
Focus on:\n\
1. Natural dialogue and character interactions\n\
2. Vivid but concise descriptions\n\
3. Smooth scene transitions\n\
4. Maintaining consistent pacing\n\
5. The chapter MUST contain at least {words} words\n\
6. The chapter MUST be self-contained and complete, while advancing the overall story\n\
\n\
Write the chapter now, ending with the word {TERMINATOR}"
    )
}

pub fn chapter_review(
    draft: &str,
    chapter: u32,
    revision: usize,
    context: &str,
    words: u32,
) -> String {
    format!(
        "Review this draft (revision {revision}) of Chapter {chapter}:\n\
\n\
{draft}\n\
\n\
Character Context:\n\
{context}\n\
\n\
Provide specific feedback on:\n\
1. Plot progression and pacing\n\
2. Character development\n\
3. Writing style and dialogue\n\
4. Areas for improvement\n\
5. Length: the writer should aim for at least {words} words per chapter\n\
\n\
Pay special attention to character consistency issues.\n\
If the chapter needs no further work, say that it is excellent.\n\
End your review with {TERMINATOR}"
    )
}

/// Renders the character block embedded in outline, draft and review requests.
pub fn character_context(characters: &[&Character]) -> String {
    let mut out = String::from("Current Character Profiles:\n");
    if characters.is_empty() {
        out.push_str("\n(no tracked characters)\n");
        return out;
    }
    for character in characters {
        let last_seen = character
            .last_appearance
            .map(|chapter| chapter.to_string())
            .unwrap_or_else(|| "N/A".to_owned());
        out.push_str(&format!(
            "\nName: {}\nRole: {}\nDescription: {}\nKey Traits: {}\nRecent Activity: Last appeared in Chapter {}\n",
            character.name,
            character.role,
            character.description,
            character.key_traits.join(", "),
            last_seen,
        ));
    }
    out
}
