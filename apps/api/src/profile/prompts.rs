// Profile extraction LLM prompt templates.

pub const PROFILE_EXTRACT_SYSTEM: &str = "\
You are a precise resume data extractor. \
Convert resume text into a single structured JSON object. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Never invent employers, titles, dates, degrees or skills that are not in the text.";

pub const PROFILE_EXTRACT_PROMPT: &str = r#"Extract a structured candidate profile from the resume below.

RESUME TEXT:
{resume_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "contact": {
    "name": "string" | null,
    "email": "string" | null,
    "phone": "string" | null,
    "location": "string" | null,
    "linkedin": "string" | null,
    "github": "string" | null
  },
  "summary": "string" | null,
  "experience": [
    {
      "company": "string",
      "title": "string",
      "start_date": "string" | null,
      "end_date": "string" | null,
      "is_current": true | false,
      "description": "string" | null
    }
  ],
  "education": [
    {
      "institution": "string",
      "degree": "string" | null,
      "field": "string" | null,
      "start_date": "string" | null,
      "end_date": "string" | null
    }
  ],
  "skills": ["string"],
  "certifications": ["string"],
  "total_experience_years": number | null
}

RULES:
1. List experience most recent first. Set is_current only for positions marked present/current.
2. Dates: copy them as "YYYY-MM" when possible, otherwise as written.
3. skills is a flat list of skill names, one technology or competency per entry.
4. total_experience_years is the total professional experience, rounded down to whole years.
5. Return ONLY the JSON object — nothing else, no code fences."#;
