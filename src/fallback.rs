use serde::{Deserialize, Serialize};

const GREETING_REPLY: &str = "Halo! Selamat datang di PT. Teknologi Maju Indonesia. Saya siap membantu Anda dengan informasi perusahaan dan lowongan kerja.";
const JOBS_REPLY: &str = "Kami memiliki 4 posisi tersedia: Senior Frontend Developer (15-25 juta), Data Scientist (18-30 juta), Product Manager (20-35 juta), dan DevOps Engineer (16-28 juta). Posisi mana yang ingin Anda ketahui?";
const COMPANY_REPLY: &str = "PT. Teknologi Maju Indonesia didirikan pada 2015 dengan 500+ karyawan di Jakarta. Kami fokus pada solusi teknologi untuk transformasi digital Indonesia.";
const DEFAULT_REPLY: &str = "Terima kasih atas pertanyaan Anda. Untuk informasi lebih lanjut, silakan hubungi HR kami di hr@teknologimaju.co.id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Greeting,
    Jobs,
    Company,
    Other,
}

// First matching row wins.
const KEYWORDS: [(Topic, &[&str]); 3] = [
    (Topic::Greeting, &["halo", "hello"]),
    (Topic::Jobs, &["lowongan", "kerja"]),
    (Topic::Company, &["perusahaan"]),
];

#[derive(Debug, Default, Deserialize)]
pub struct FallbackRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub choices: Vec<FallbackChoice>,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackChoice {
    pub message: FallbackMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackMessage {
    pub content: String,
}

impl Topic {
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|word| message.contains(word)))
            .map_or(Self::Other, |(topic, _)| *topic)
    }

    pub fn reply(self) -> &'static str {
        match self {
            Self::Greeting => GREETING_REPLY,
            Self::Jobs => JOBS_REPLY,
            Self::Company => COMPANY_REPLY,
            Self::Other => DEFAULT_REPLY,
        }
    }
}

pub fn canned_response(message: &str) -> FallbackResponse {
    FallbackResponse {
        choices: vec![FallbackChoice {
            message: FallbackMessage {
                content: Topic::classify(message).reply().to_string(),
            },
        }],
        fallback: true,
    }
}
