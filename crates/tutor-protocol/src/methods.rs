// Well-known event names pushed over the `/voice` WS surface (§4.8, §6.2).

pub const EVENT_STATE: &str = "state";
pub const EVENT_TEXT_CHUNK: &str = "text_chunk";
pub const EVENT_AUDIO_CHUNK: &str = "audio_chunk";
pub const EVENT_ERROR: &str = "error";

// Client → server inbound frame kinds on `/voice`.
pub const INBOUND_AUDIO_CHUNK: &str = "audio_chunk";
pub const INBOUND_FINAL_TRANSCRIPT: &str = "final_transcript";
pub const INBOUND_BARGE_IN: &str = "barge_in";

// Representative REST routes the core's payload types are built for (§6.2).
// Path parsing and multipart decoding live outside the core; these constants
// exist so the gateway and tests share one spelling.
pub const ROUTE_INGEST_UPLOAD: &str = "/ingest/upload";
pub const ROUTE_TASK_STATUS: &str = "/tasks/{task_id}";
pub const ROUTE_SESSION_CHECK: &str = "/session/check";
pub const ROUTE_SESSION_CREATE: &str = "/session/create";
pub const ROUTE_SESSION_END: &str = "/session/end";
pub const ROUTE_SESSION_HISTORY: &str = "/session/history";
pub const ROUTE_CHAT: &str = "/chat";
pub const ROUTE_CHAT_AUDIO: &str = "/chat+audio";
pub const ROUTE_COURSES: &str = "/courses";
pub const ROUTE_COURSE_BY_REF: &str = "/courses/{id_or_number}";
pub const ROUTE_QUIZ_GENERATE: &str = "/quiz/generate/{module|course}";
pub const ROUTE_QUIZ_SUBMIT: &str = "/quiz/submit";
pub const ROUTE_VOICE_WS: &str = "/voice";
