use anyhow::Result;
use async_trait::async_trait;
use candle_core::{D, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaEosToks};
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde_json::Value;
use std::fs;
use tokenizers::Tokenizer;

use crate::error::GenerationError;
use crate::models::traits::{LanguageModel, SamplingParams};

/// Llama-family causal language model loaded from the Hugging Face hub.
///
/// Weights and tokenizer are fetched once at startup; after that the model
/// is read-only and every generation call builds its own KV cache, so a
/// single instance serves concurrent requests without locking.
pub struct LlamaChatModel {
    model: Llama,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    config: Config,
    model_id: String,
    eos_token_id: u32,
    eos_token: String,
}

impl std::fmt::Debug for LlamaChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LlamaChatModel({})", self.model_id)
    }
}

impl LlamaChatModel {
    pub async fn load(model_id: &str, revision: &str) -> Result<Self> {
        tracing::info!("loading model {model_id} (revision {revision})...");

        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        let dtype = if matches!(device, Device::Cpu) {
            DType::F32
        } else {
            DType::F16
        };
        tracing::info!("selected device: {:?} ({:?})", device, dtype);

        // Hub download and weight mapping are blocking; keep them off the
        // async runtime.
        let id = model_id.to_string();
        let rev = revision.to_string();
        let dev = device.clone();
        let (model, tokenizer, config) =
            tokio::task::spawn_blocking(move || Self::load_sync(&id, &rev, &dev, dtype)).await??;

        let eos_token_id = match config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => id,
            Some(LlamaEosToks::Multiple(ref ids)) => ids.first().copied().unwrap_or(2),
            None => 2,
        };
        let eos_token = tokenizer
            .id_to_token(eos_token_id)
            .unwrap_or_else(|| "</s>".to_string());

        tracing::info!("model {model_id} loaded successfully");
        Ok(Self {
            model,
            tokenizer,
            device,
            dtype,
            config,
            model_id: model_id.to_string(),
            eos_token_id,
            eos_token,
        })
    }

    fn load_sync(
        model_id: &str,
        revision: &str,
        device: &Device,
        dtype: DType,
    ) -> Result<(Llama, Tokenizer, Config)> {
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        tracing::info!("downloading configuration files...");
        let config_file = repo
            .get("config.json")
            .map_err(|e| anyhow::anyhow!("Failed to download config.json: {}", e))?;
        let tokenizer_file = repo
            .get("tokenizer.json")
            .map_err(|e| anyhow::anyhow!("Failed to download tokenizer.json: {}", e))?;

        let config_json = fs::read_to_string(&config_file)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_file)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let config = Self::parse_llama_config(&config_json)?;
        tracing::info!(
            "parsed config: vocab_size={}, hidden_size={}, num_layers={}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers
        );

        tracing::info!("downloading model weights...");
        let weight_files = Self::download_weight_files(&repo)?;
        let vars = Self::load_weights(&weight_files, device, dtype)?;

        tracing::info!("building model graph...");
        let model = Llama::load(vars, &config)?;

        Ok((model, tokenizer, config))
    }

    fn parse_llama_config(config_json: &str) -> Result<Config> {
        let config: Value = serde_json::from_str(config_json)?;

        let vocab_size = config["vocab_size"].as_u64().unwrap_or(32000) as usize;
        let hidden_size = config["hidden_size"].as_u64().unwrap_or(2048) as usize;
        let intermediate_size = config["intermediate_size"].as_u64().unwrap_or(5632) as usize;
        let num_hidden_layers = config["num_hidden_layers"].as_u64().unwrap_or(22) as usize;
        let num_attention_heads = config["num_attention_heads"].as_u64().unwrap_or(32) as usize;
        let num_key_value_heads = config
            .get("num_key_value_heads")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(num_attention_heads);
        let rms_norm_eps = config["rms_norm_eps"].as_f64().unwrap_or(1e-5);
        let rope_theta = config
            .get("rope_theta")
            .and_then(|v| v.as_f64())
            .unwrap_or(10000.0);
        let max_position_embeddings = config
            .get("max_position_embeddings")
            .and_then(|v| v.as_u64())
            .unwrap_or(2048) as usize;

        Ok(Config {
            vocab_size,
            hidden_size,
            intermediate_size,
            num_hidden_layers,
            num_attention_heads,
            num_key_value_heads,
            rms_norm_eps,
            rope_theta: rope_theta as f32,
            max_position_embeddings,
            bos_token_id: Some(
                config
                    .get("bos_token_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(1) as u32,
            ),
            eos_token_id: Some(LlamaEosToks::Single(
                config
                    .get("eos_token_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(2) as u32,
            )),
            rope_scaling: None,
            tie_word_embeddings: config
                .get("tie_word_embeddings")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            use_flash_attn: false,
        })
    }

    fn download_weight_files(repo: &hf_hub::api::sync::ApiRepo) -> Result<Vec<std::path::PathBuf>> {
        let possible_patterns = vec![
            vec!["model.safetensors".to_string()],
            (1..=2)
                .map(|i| format!("model-{i:05}-of-00002.safetensors"))
                .collect::<Vec<_>>(),
            vec!["pytorch_model.bin".to_string()],
            (1..=2)
                .map(|i| format!("pytorch_model-{i:05}-of-00002.bin"))
                .collect::<Vec<_>>(),
        ];

        for pattern in possible_patterns {
            let mut pattern_files = Vec::new();
            let mut all_found = true;

            for filename in &pattern {
                match repo.get(filename) {
                    Ok(path) => {
                        tracing::debug!("found weight file: {}", filename);
                        pattern_files.push(path);
                    }
                    Err(_) => {
                        all_found = false;
                        break;
                    }
                }
            }

            if all_found && !pattern_files.is_empty() {
                tracing::info!("found {} weight file(s)", pattern_files.len());
                return Ok(pattern_files);
            }
        }

        Err(anyhow::anyhow!("No model weight files found"))
    }

    fn load_weights<'a>(
        weight_files: &'a [std::path::PathBuf],
        device: &'a Device,
        dtype: DType,
    ) -> Result<VarBuilder<'a>> {
        if weight_files[0].extension().and_then(|s| s.to_str()) == Some("safetensors") {
            tracing::info!("loading safetensors weights...");
            unsafe {
                Ok(VarBuilder::from_mmaped_safetensors(
                    weight_files,
                    dtype,
                    device,
                )?)
            }
        } else {
            tracing::info!("loading PyTorch weights...");
            let mut all_tensors = std::collections::HashMap::new();
            for weight_file in weight_files {
                let tensors_vec = candle_core::pickle::read_all(weight_file)?;
                all_tensors.extend(tensors_vec);
            }
            Ok(VarBuilder::from_tensors(all_tensors, dtype, device))
        }
    }

    fn is_eos_token(&self, token_id: u32) -> bool {
        token_id == self.eos_token_id
    }

    /// Logits for the last position of a forward pass, handling both
    /// `(seq_len, vocab)` and `(vocab,)` shapes after the batch squeeze.
    fn last_position_logits(output: Tensor) -> Result<Tensor, GenerationError> {
        let logits = output.squeeze(0)?;
        if logits.dims().len() == 2 {
            Ok(logits.get(logits.dim(0)? - 1)?)
        } else {
            Ok(logits)
        }
    }

    /// Temperature plus nucleus (top-p) sampling over the next-token logits.
    fn sample(&self, logits: &Tensor, params: &SamplingParams) -> Result<u32, GenerationError> {
        use candle_nn::ops::softmax;
        use rand::prelude::*;

        let logits = logits.to_dtype(DType::F32)?;
        if params.temperature <= 0.0 {
            return Ok(logits.argmax(D::Minus1)?.to_scalar::<u32>()?);
        }

        let scaled = (logits / params.temperature)?;
        let probs = softmax(&scaled, D::Minus1)?;
        let probs: Vec<f32> = probs.to_vec1()?;

        let mut indexed: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        // Keep the smallest prefix whose cumulative mass reaches top_p.
        let mut cumulative = 0.0f32;
        let mut cutoff = indexed.len();
        for (i, (_, prob)) in indexed.iter().enumerate() {
            cumulative += prob;
            if cumulative >= params.top_p as f32 {
                cutoff = i + 1;
                break;
            }
        }

        let mut rng = rand::rng();
        let total_mass: f32 = indexed[..cutoff].iter().map(|(_, p)| p).sum();
        let mut draw = rng.random::<f32>() * total_mass;
        for &(idx, prob) in &indexed[..cutoff] {
            draw -= prob;
            if draw <= 0.0 {
                return Ok(idx as u32);
            }
        }

        Ok(indexed[0].0 as u32)
    }
}

#[async_trait]
impl LanguageModel for LlamaChatModel {
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| GenerationError::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    async fn generate(
        &self,
        input_ids: &[u32],
        params: &SamplingParams,
    ) -> Result<Vec<u32>, GenerationError> {
        if input_ids.is_empty() {
            return Err(GenerationError::Inference(
                "empty input sequence".to_string(),
            ));
        }

        tracing::debug!(
            prompt_tokens = input_ids.len(),
            max_new_tokens = params.max_new_tokens,
            "starting generation"
        );

        // Fresh KV cache per call; the shared weights stay read-only.
        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut output = input_ids.to_vec();

        let input = Tensor::from_vec(input_ids.to_vec(), (1, input_ids.len()), &self.device)?;
        let logits = self.model.forward(&input, 0, &mut cache)?;
        let mut next = self.sample(&Self::last_position_logits(logits)?, params)?;
        let mut ctx_len = input_ids.len();

        let mut generated = 0usize;
        while generated < params.max_new_tokens && !self.is_eos_token(next) {
            output.push(next);
            generated += 1;
            if generated == params.max_new_tokens {
                break;
            }

            // Incremental decode: feed only the new token at the running
            // context offset.
            let step = Tensor::from_vec(vec![next], (1, 1), &self.device)?;
            let logits = self.model.forward(&step, ctx_len, &mut cache)?;
            ctx_len += 1;
            next = self.sample(&Self::last_position_logits(logits)?, params)?;
        }

        tracing::debug!(new_tokens = generated, "generation finished");
        Ok(output)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, GenerationError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| GenerationError::Decoding(e.to_string()))
    }

    fn eos_token(&self) -> &str {
        &self.eos_token
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
