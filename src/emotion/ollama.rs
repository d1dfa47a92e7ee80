use super::{EmotionClassifier, Prediction};
use crate::error::ClassifierError;
use crate::responses::known_labels;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Asks a local Ollama model to name the emotion in one word.
pub struct OllamaClassifier {
    client: Client,
    url: String,
    model: String,
}

impl OllamaClassifier {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ClassifierError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    fn prompt(text: &str) -> String {
        let labels: Vec<&str> = known_labels().collect();
        format!(
            "Classify the emotion expressed in the text below. Answer with exactly one word from this list: {}.\n\nText: {}",
            labels.join(", "),
            text
        )
    }
}

/// First alphabetic word of the model's answer, lower-cased.
fn first_word(answer: &str) -> Option<String> {
    answer
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

#[async_trait]
impl EmotionClassifier for OllamaClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<Prediction>, ClassifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "model": self.model,
                "prompt": Self::prompt(text),
                "stream": false
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        let answer = json["response"]
            .as_str()
            .ok_or_else(|| ClassifierError::Parse("missing 'response' field".to_string()))?;

        let label = first_word(answer).ok_or(ClassifierError::NoLabel)?;
        Ok(vec![Prediction { label, score: 1.0 }])
    }

    fn id(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_word() {
        assert_eq!(first_word("Joy."), Some("joy".to_string()));
        assert_eq!(first_word("  **sadness** because"), Some("sadness".to_string()));
        assert_eq!(first_word("..."), None);
    }

    #[test]
    fn test_prompt_lists_labels() {
        let prompt = OllamaClassifier::prompt("hi");
        assert!(prompt.contains("enthusiasm"));
        assert!(prompt.ends_with("Text: hi"));
    }

    #[tokio::test]
    async fn test_classifies_from_generate_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_body(r#"{"model":"llama3","response":"Anger","done":true}"#)
            .create_async()
            .await;

        let classifier =
            OllamaClassifier::new(&server.url(), "llama3", Duration::from_secs(5)).unwrap();
        let predictions = classifier.classify("I am furious").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            predictions,
            vec![Prediction {
                label: "anger".to_string(),
                score: 1.0
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_answer_has_no_label() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_body(r#"{"response":""}"#)
            .create_async()
            .await;

        let classifier =
            OllamaClassifier::new(&server.url(), "llama3", Duration::from_secs(5)).unwrap();
        let result = classifier.classify("...").await;
        assert!(matches!(result, Err(ClassifierError::NoLabel)));
    }
}
