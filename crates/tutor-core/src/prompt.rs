//! Prompt templates sent to the generation service.

use serde_json::{json, Value};

/// Separator the model emits between the lesson and the quiz JSON.
pub const QUIZ_SEPARATOR: &str = "---QUIZ_START---";

/// Builds the prompt requesting a course syllabus for `topic`.
#[must_use]
pub fn syllabus_prompt(topic: &str) -> String {
    format!(
        "Create a comprehensive course syllabus for learning about: \"{topic}\".\n\
         The course should be broken down into 4-6 logical modules.\n\
         Ensure the title is catchy and the description is motivating."
    )
}

/// Response schema constraining the syllabus document.
#[must_use]
pub fn syllabus_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": {
                "type": "STRING",
                "description": "The title of the course"
            },
            "description": {
                "type": "STRING",
                "description": "A short, engaging description of the course outcomes"
            },
            "modules": {
                "type": "ARRAY",
                "description": "List of modules",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING", "description": "Module title" },
                        "description": {
                            "type": "STRING",
                            "description": "What will be covered in this module"
                        }
                    },
                    "required": ["title", "description"]
                }
            }
        },
        "required": ["title", "description", "modules"]
    })
}

/// Builds the prompt that streams one module's lesson followed by its quiz.
#[must_use]
pub fn lesson_prompt(course_title: &str, module_title: &str, module_description: &str) -> String {
    format!(
        r#"You are an expert and engaging teacher. You are teaching the module "{module_title}" from the course "{course_title}".

Module Description: {module_description}

PART 1: THE LESSON
Structure your lesson in valid Markdown.
- Introduction
- Core Concepts (Explain clearly, use analogies)
- Examples/Code (if technical)
- Summary

PART 2: THE QUIZ
After the lesson, you MUST output a separator string exactly like this: "{QUIZ_SEPARATOR}"
Immediately after the separator, provide a valid JSON array of 3-5 objects representing multiple-choice questions.
Do NOT wrap the JSON in markdown code blocks. Just raw JSON text after the separator.

JSON Format per question:
{{
  "question": "string",
  "options": ["string", "string", "string", "string"],
  "correctAnswer": number (0-3 index of the correct option),
  "explanation": "string (brief explanation of why)"
}}

Tone: Enthusiastic, clear, and encouraging.
"#
    )
}
