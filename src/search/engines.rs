/// Placeholder replaced by the encoded query in an engine's url template.
pub const QUERY_PLACEHOLDER: &str = "%s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEngine {
    pub name: String,
    /// Search url, either containing `%s` or ending where the query goes.
    pub url: String,
    pub aliases: Vec<String>,
}

impl SearchEngine {
    pub fn new(name: &str, url: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Case-insensitive match on the name or any alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn search_url(&self, query: &str) -> String {
        let encoded = urlencoding::encode(query);
        if self.url.contains(QUERY_PLACEHOLDER) {
            self.url.replacen(QUERY_PLACEHOLDER, &encoded, 1)
        } else {
            format!("{}{}", self.url, encoded)
        }
    }
}

/// The configured engines plus which one is the default.
#[derive(Debug, Clone)]
pub struct SearchEngines {
    engines: Vec<SearchEngine>,
    default: usize,
}

impl Default for SearchEngines {
    fn default() -> Self {
        Self {
            engines: vec![
                SearchEngine::new("google", "https://www.google.com/search?q=%s", &["g"]),
                SearchEngine::new("bing", "https://www.bing.com/search?q=%s", &["b"]),
                SearchEngine::new("baidu", "https://www.baidu.com/s?wd=%s", &["bd"]),
                SearchEngine::new("duckduckgo", "https://duckduckgo.com/?q=%s", &["ddg"]),
            ],
            default: 0,
        }
    }
}

impl SearchEngines {
    /// Returns `None` when `engines` is empty.
    pub fn new(engines: Vec<SearchEngine>) -> Option<Self> {
        if engines.is_empty() {
            return None;
        }
        Some(Self { engines, default: 0 })
    }

    pub fn default_engine(&self) -> &SearchEngine {
        &self.engines[self.default]
    }

    /// Makes `name` the default. Returns false if no engine answers to it.
    pub fn set_default(&mut self, name: &str) -> bool {
        match self.engines.iter().position(|e| e.answers_to(name)) {
            Some(index) => {
                self.default = index;
                true
            }
            None => false,
        }
    }

    pub fn find(&self, name: &str) -> Option<&SearchEngine> {
        self.engines.iter().find(|e| e.answers_to(name))
    }

    /// Search url on the named engine, or on the default when unknown.
    pub fn search_url(&self, engine: &str, query: &str) -> String {
        match self.find(engine) {
            Some(found) => found.search_url(query),
            None => {
                log::debug!("Unknown search engine {:?}, using {}", engine, self.default_engine().name);
                self.default_engine().search_url(query)
            }
        }
    }

    pub fn default_search_url(&self, query: &str) -> String {
        self.default_engine().search_url(query)
    }
}
