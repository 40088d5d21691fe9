//! 由模型名或路径确定分词器类别，定位词表文件并构造分词器。

use crate::{
    class::{TokenizerClass, MODEL_TYPES, NAME_HINTS},
    error::{Error, LoadError},
    tokenizer::Tokenizer,
};
use serde::Deserialize;
use std::{
    env, fs, io,
    path::{Component, Path, PathBuf},
};

/// 依次尝试读取的模型配置文件
const CONFIG_FILES: [&str; 2] = ["config.json", "language_model_config.json"];

/// 构造分词器的选项。
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// 指定类别时跳过推断
    pub tokenizer_class: Option<TokenizerClass>,
    /// hub 缓存中的分支名或提交号，默认 `main`
    pub revision: Option<String>,
    /// 是否报告偏移
    pub use_fast: bool,
    /// 覆盖类别默认值和 tokenizer_config.json
    pub do_lower_case: Option<bool>,
    /// hub 缓存的根目录
    pub cache_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            tokenizer_class: None,
            revision: None,
            use_fast: true,
            do_lower_case: None,
            cache_dir: None,
        }
    }
}

impl LoadOptions {
    pub fn tokenizer_class(mut self, class: TokenizerClass) -> Self {
        self.tokenizer_class = Some(class);
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn use_fast(mut self, use_fast: bool) -> Self {
        self.use_fast = use_fast;
        self
    }

    pub fn do_lower_case(mut self, do_lower_case: bool) -> Self {
        self.do_lower_case = Some(do_lower_case);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// config.json 中用于推断类别的字段。
#[derive(Clone, Default, PartialEq, Eq, Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub architectures: Vec<String>,
}

#[derive(Default, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    do_lower_case: Option<bool>,
}

/// 按模型名或本地路径加载分词器。
///
/// 未指定类别时依次根据模型配置和模型名推断。
/// 推断、读取或构造过程中的任何错误都会包装为 [`Error::Load`]。
pub fn get_tokenizer(name_or_path: &str, options: &LoadOptions) -> Result<Tokenizer, Error> {
    load(name_or_path, options).map_err(|source| Error::Load {
        model: name_or_path.to_string(),
        source,
    })
}

/// 只推断类别，不构造分词器。
pub fn infer_tokenizer_class(
    name_or_path: &str,
    options: &LoadOptions,
) -> Result<TokenizerClass, LoadError> {
    if let Some(class) = options.tokenizer_class {
        return Ok(class);
    }
    let dir = locate(name_or_path, options);
    infer(name_or_path, dir.as_deref())
}

fn load(name_or_path: &str, options: &LoadOptions) -> Result<Tokenizer, LoadError> {
    let dir = locate(name_or_path, options);
    let class = match options.tokenizer_class {
        Some(class) => class,
        None => infer(name_or_path, dir.as_deref())?,
    };
    log::debug!("Loading tokenizer of type '{class}'");

    let dir = dir.ok_or_else(|| LoadError::Io {
        path: PathBuf::from(name_or_path),
        source: io::Error::new(io::ErrorKind::NotFound, "model directory not found"),
    })?;
    let mut params = class.default_params();
    if let Some(config) = read_json::<TokenizerConfig>(&dir.join("tokenizer_config.json"))? {
        if let Some(lower) = config.do_lower_case {
            params.do_lower_case = lower;
        }
    }
    if let Some(lower) = options.do_lower_case {
        params.do_lower_case = lower;
    }
    Tokenizer::from_pretrained(&dir, class, params.do_lower_case, options.use_fast)
}

fn infer(name: &str, dir: Option<&Path>) -> Result<TokenizerClass, LoadError> {
    let config = match dir {
        Some(dir) => read_config(dir)?,
        None => None,
    };
    let Some(config) = config else {
        log::warn!(
            "No config file found. Trying to infer tokenizer type from model name `{name}`"
        );
        return infer_from_name(name);
    };

    let model_type = config.model_type.as_deref().unwrap_or_default();
    if let Some(&class) = MODEL_TYPES.get(model_type) {
        return Ok(class);
    }
    if model_type == "dpr" {
        return match config.architectures.first().map(String::as_str) {
            Some("DPRQuestionEncoder") => Ok(TokenizerClass::DprQuestionEncoder),
            Some("DPRContextEncoder") => Ok(TokenizerClass::DprContextEncoder),
            Some("DPRReader") => Err(LoadError::Unsupported(
                "DPRReader models are currently not supported".into(),
            )),
            _ => Err(unresolved(name)),
        };
    }
    log::warn!(
        "Could not infer tokenizer type from config `model_type = {model_type:?}`. \
         Trying to infer tokenizer type from model name `{name}`"
    );
    infer_from_name(name)
}

fn infer_from_name(name: &str) -> Result<TokenizerClass, LoadError> {
    let lower = name.to_lowercase();
    let class = NAME_HINTS
        .iter()
        .find(|(hint, _)| lower.contains(hint))
        .map(|&(_, class)| class)
        .ok_or_else(|| unresolved(name))?;
    if class == TokenizerClass::Roberta && lower.contains("mlm") {
        return Err(LoadError::Unsupported(
            "MLM part of codebert is currently not supported".into(),
        ));
    }
    Ok(class)
}

fn unresolved(name: &str) -> LoadError {
    LoadError::Unresolved {
        name: name.to_string(),
        candidates: TokenizerClass::candidates(),
    }
}

/// 先读 config.json，没有时读 language_model_config.json。
fn read_config(dir: &Path) -> Result<Option<ModelConfig>, LoadError> {
    for name in CONFIG_FILES {
        if let Some(config) = read_json(&dir.join(name))? {
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// 文件不存在时返回 `None`，存在但无法解析时报错。
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, LoadError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// 本地目录直接使用，否则在 hub 缓存中查找 `models--{org}--{name}/snapshots/{commit}`。
fn locate(name_or_path: &str, options: &LoadOptions) -> Option<PathBuf> {
    let path = Path::new(name_or_path);
    if path.is_dir() {
        return Some(path.to_path_buf());
    }
    let cache = options.cache_dir.clone().or_else(default_cache_dir)?;
    let repo = cache.join(format!("models--{}", name_or_path.replace('/', "--")));
    let revision = options.revision.as_deref().unwrap_or("main");
    if !is_relative_name(revision) {
        log::warn!("ignoring revision `{revision}`: not a branch name or commit hash");
        return None;
    }
    let commit = fs::read_to_string(repo.join("refs").join(revision))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| revision.to_string());
    if !is_relative_name(&commit) {
        log::warn!("ignoring ref `{revision}` of `{name_or_path}`: bad commit `{commit}`");
        return None;
    }
    let snapshot = repo.join("snapshots").join(commit);
    if snapshot.is_dir() {
        log::debug!("found `{name_or_path}` in hub cache at {}", snapshot.display());
        Some(snapshot)
    } else {
        None
    }
}

/// 分支名和提交号只能由普通路径分量组成，不能跳出 hub 缓存的仓库目录
fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('\\')
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn default_cache_dir() -> Option<PathBuf> {
    env::var_os("HF_HUB_CACHE")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HF_HOME").map(|home| PathBuf::from(home).join("hub")))
        .or_else(|| {
            env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache/huggingface/hub"))
        })
}
