//! Splice Runtime - 프로세스 단위 서비스 객체
//!
//! 레지스트리, 검색기, 패치 엔진, 설정, 플러그인 매니저를 한 번 생성해
//! 묶습니다. 테스트는 매번 새 런타임을 만들어 격리합니다.

use crate::filter::ModuleQuery;
use crate::module::{ExportValue, ModuleEvaluator, ModuleId, ModuleRegistry};
use crate::patch::{PatchEngine, PatchEngineConfig};
use crate::plugin::{PluginCatalogue, PluginManager, StartAt, StartSummary};
use crate::settings::{default_settings, SettingsStore};
use splice_foundation::{NativeBridge, Result, RuntimeConfig, UrlPolicy};
use std::sync::Arc;
use tracing::{info, warn};

/// 런타임
pub struct SpliceRuntime {
    config: RuntimeConfig,
    bridge: Arc<dyn NativeBridge>,
    registry: Arc<ModuleRegistry>,
    query: Arc<ModuleQuery>,
    engine: Arc<PatchEngine>,
    settings: Arc<SettingsStore>,
    plugins: Arc<PluginManager>,
    url_policy: UrlPolicy,
}

impl SpliceRuntime {
    /// 설정 로드 → 활성 패치 등록 → 모듈 로더 가로채기 → Init 플러그인 시작
    pub fn bootstrap(
        config: RuntimeConfig,
        bridge: Arc<dyn NativeBridge>,
        catalogue: PluginCatalogue,
    ) -> Result<Self> {
        let settings = Arc::new(SettingsStore::load(
            Arc::clone(&bridge),
            &default_settings(),
            config.persist_debounce(),
        ));
        settings.register_defaults(&catalogue.settings_defaults());

        let registry = Arc::new(ModuleRegistry::new());
        let query = ModuleQuery::new(Arc::clone(&registry));
        let engine = Arc::new(PatchEngine::new(PatchEngineConfig::from_runtime(&config)));
        let plugins = Arc::new(PluginManager::new(
            Arc::new(catalogue),
            Arc::clone(&settings),
            Arc::clone(&engine),
            Arc::clone(&query),
        ));

        let summary = plugins.init()?;
        registry.intercept(engine.clone())?;
        let started = plugins.start_all(StartAt::Init);

        info!(
            "Splice runtime ready: {} plugins enabled, {} patches, {} started at init",
            summary.enabled.len(),
            summary.patches_registered,
            started.started.len()
        );

        Ok(Self {
            url_policy: config.url_policy(),
            config,
            bridge,
            registry,
            query,
            engine,
            settings,
            plugins,
        })
    }

    // ========================================================================
    // 호스트 이벤트
    // ========================================================================

    /// 호스트 모듈 로드 (정의 + 평가)
    pub fn load_module(
        &self,
        id: impl Into<ModuleId>,
        source: &str,
        evaluator: &dyn ModuleEvaluator,
    ) -> Result<Arc<ExportValue>> {
        self.registry.load_module(id, source, evaluator)
    }

    /// 호스트 모듈 준비 완료
    pub fn modules_ready(&self) -> StartSummary {
        self.plugins.start_all(StartAt::ModulesReady)
    }

    /// DOM 준비 완료 - 남은 플러그인 시작, 매칭되지 않은 패치 경고
    pub fn dom_ready(&self) -> StartSummary {
        let summary = self.plugins.start_all(StartAt::DomReady);
        self.engine.warn_unmatched();
        summary
    }

    // ========================================================================
    // 셸 연동
    // ========================================================================

    /// 허용된 scheme이면 외부 URL 열기
    pub async fn open_external_url(&self, raw: &str) -> Result<()> {
        let url = self.url_policy.check(raw).map_err(|e| {
            warn!(url = raw, "Blocked external URL: {}", e);
            e
        })?;
        self.bridge.open_external(&url).await
    }

    /// quick CSS (useQuickCss가 꺼져 있으면 None)
    pub fn quick_css(&self) -> Result<Option<String>> {
        if self.settings.get_bool("useQuickCss") != Some(true) {
            return Ok(None);
        }
        Ok(Some(self.bridge.get_quick_style_text()?))
    }

    /// 대기 중인 설정 저장 완료
    pub async fn flush(&self) {
        self.settings.flush().await;
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn query(&self) -> &Arc<ModuleQuery> {
        &self.query
    }

    pub fn engine(&self) -> &Arc<PatchEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }
}
