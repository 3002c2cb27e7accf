use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use rewear_types::api::{DescriptionRequest, ImageAnalysis, Interest, Moderation, PointsRequest};

use crate::parse::{DEFAULT_POINTS, clamp_points, parse_json, parse_points};

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("AI API returned no content")]
    EmptyResponse,

    #[error("could not parse AI response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    /// `None` disables every call; they fail with `NotConfigured`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            vision_model: "gpt-4o-mini".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiClient {
    http: reqwest::Client,
    config: AiConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl AiClient {
    pub fn new(mut config: AiConfig) -> Self {
        config.api_key = config.api_key.filter(|k| !k.trim().is_empty());
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Sends one chat completion and returns the first choice's text.
    async fn chat(&self, model: &str, messages: Value, max_tokens: u32) -> Result<String, AiError> {
        let api_key = self.config.api_key.as_deref().ok_or(AiError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.config.base_url);

        debug!("AI request to {} using {}", url, model);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": model,
                "messages": messages,
                "max_tokens": max_tokens,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AiError::Api { status: status.as_u16(), message });
        }

        let body: ChatResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }

    async fn ask(&self, system: &str, user: String, max_tokens: u32) -> Result<String, AiError> {
        let messages = json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ]);
        self.chat(&self.config.model, messages, max_tokens).await
    }

    pub async fn analyze_image(&self, image_url: &str) -> Result<ImageAnalysis, AiError> {
        let prompt = "Analyze this clothing item image and provide:
1. Category (e.g., tops, bottoms, dresses, outerwear, shoes, accessories)
2. Type (e.g., t-shirt, jeans, dress, jacket, sneakers, bag)
3. Color(s)
4. Style (e.g., casual, formal, vintage, sporty)
5. Material (if visible)
6. Condition assessment (new, like_new, good, fair, poor)
7. Relevant tags

Respond in JSON format:
{\"category\": \"string\", \"type\": \"string\", \"colors\": [\"string\"], \"style\": \"string\",
 \"material\": \"string\", \"condition\": \"string\", \"tags\": [\"string\"]}";

        let messages = json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": image_url } },
            ],
        }]);
        let reply = self.chat(&self.config.vision_model, messages, 500).await?;
        parse_json(&reply)
    }

    pub async fn generate_description(&self, item: &DescriptionRequest) -> Result<String, AiError> {
        let user = format!(
            "Generate a compelling description for this clothing item:
Category: {}
Type: {}
Colors: {}
Style: {}
Material: {}
Condition: {}

Write a 2-3 sentence description that's engaging and accurate.",
            or_unknown(&item.category),
            or_unknown(&item.item_type),
            item.colors.join(", "),
            or_unknown(&item.style),
            or_unknown(&item.material),
            or_unknown(&item.condition),
        );
        let reply = self
            .ask(
                "You are a fashion expert helping users describe clothing items for a sustainable \
                 fashion exchange platform. Write engaging, accurate descriptions that highlight \
                 the item's features and appeal.",
                user,
                150,
            )
            .await?;
        Ok(reply.trim().to_string())
    }

    /// Never fails: any error or unusable reply yields the default of 50.
    pub async fn suggest_points(&self, item: &PointsRequest) -> i64 {
        let user = format!(
            "Suggest a fair point value (10-500 points) for this item:
Category: {}
Type: {}
Style: {}
Condition: {}
Brand: {}

Respond with just the number.",
            or_unknown(&item.category),
            or_unknown(&item.item_type),
            or_unknown(&item.style),
            or_unknown(&item.condition),
            or_unknown(&item.brand),
        );
        let reply = self
            .ask(
                "You are a fashion expert helping determine fair point values for clothing items \
                 in a sustainable fashion exchange. Consider brand, condition, style, and market demand.",
                user,
                10,
            )
            .await;

        match reply {
            Ok(text) => clamp_points(parse_points(&text)),
            Err(AiError::NotConfigured) => DEFAULT_POINTS,
            Err(e) => {
                warn!("AI points suggestion failed: {}", e);
                DEFAULT_POINTS
            }
        }
    }

    pub async fn recommendations(&self, interests: &[Interest]) -> Result<Vec<Value>, AiError> {
        let prefs = serde_json::to_string(interests).map_err(|e| AiError::Parse(e.to_string()))?;
        let user = format!(
            "Based on these user preferences, suggest 5 clothing categories/types they might be interested in:
{}

Respond with a JSON array of category/type combinations.",
            prefs
        );
        let reply = self
            .ask(
                "You are a fashion recommendation system. Based on user preferences and behavior, \
                 suggest clothing categories and styles they might like.",
                user,
                200,
            )
            .await?;
        parse_json(&reply)
    }

    pub async fn moderate(&self, title: &str, description: &str) -> Result<Moderation, AiError> {
        let user = format!(
            "Moderate this clothing item content:
Title: {}
Description: {}

Respond with JSON:
{{\"isAppropriate\": boolean, \"reason\": \"string if inappropriate\", \"suggestedChanges\": \"string if needed\"}}",
            title, description
        );
        let reply = self
            .ask(
                "You are a content moderator for a clothing exchange platform. Check if the content \
                 is appropriate and follows community guidelines.",
                user,
                200,
            )
            .await?;
        parse_json(&reply)
    }

    pub async fn extract_tags(&self, text: &str) -> Result<Vec<String>, AiError> {
        let user = format!(
            "Extract relevant tags from this text: \"{}\"

Respond with a JSON array of tags (strings).",
            text
        );
        let reply = self
            .ask(
                "Extract relevant fashion tags from the given text. Focus on style, color, \
                 material, occasion, and brand information.",
                user,
                100,
            )
            .await?;
        parse_json(&reply)
    }
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.trim().is_empty()).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> AiClient {
        AiClient::new(AiConfig {
            api_key: Some("   ".into()),
            ..AiConfig::default()
        })
    }

    #[test]
    fn blank_key_means_unconfigured() {
        assert!(!unconfigured().is_configured());
        let configured = AiClient::new(AiConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://localhost:9999/v1/".into(),
            ..AiConfig::default()
        });
        assert!(configured.is_configured());
        assert_eq!(configured.config.base_url, "http://localhost:9999/v1");
    }

    #[tokio::test]
    async fn unconfigured_calls_fail_but_points_fall_back() {
        let ai = unconfigured();
        assert!(matches!(ai.analyze_image("http://x/y.png").await, Err(AiError::NotConfigured)));
        assert!(matches!(ai.extract_tags("red wool").await, Err(AiError::NotConfigured)));
        assert!(matches!(ai.moderate("t", "d").await, Err(AiError::NotConfigured)));
        assert_eq!(ai.suggest_points(&PointsRequest::default()).await, DEFAULT_POINTS);
    }
}
