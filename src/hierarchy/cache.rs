use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rsnavtree_engine::{NodeKey, RulesetVariables};

use crate::collab::RulesetBundle;
use crate::error::{NavError, NavResult};

use super::level::HierarchyLevel;
use super::record::{NodeArena, NodeHandle, NodeRecord};

/// （规则集，变量快照）组合：拥有节点仓库与全部层级
#[derive(Debug)]
pub(crate) struct Combination {
    pub ruleset_id: String,
    pub bundle: Arc<RulesetBundle>,
    pub variables: Arc<RulesetVariables>,
    variables_hash: u64,
    pub arena: NodeArena,
    levels: RwLock<FxHashMap<Option<NodeHandle>, Arc<HierarchyLevel>>>,
    key_index: RwLock<FxHashMap<u64, NodeHandle>>,
    children_flags: RwLock<FxHashMap<NodeHandle, bool>>,
    invalidated: AtomicBool,
}

impl Combination {
    pub fn new(bundle: Arc<RulesetBundle>, variables: RulesetVariables) -> Self {
        Self {
            ruleset_id: bundle.id().to_string(),
            variables_hash: variables.snapshot_hash(),
            bundle,
            variables: Arc::new(variables),
            arena: NodeArena::default(),
            levels: RwLock::new(FxHashMap::default()),
            key_index: RwLock::new(FxHashMap::default()),
            children_flags: RwLock::new(FxHashMap::default()),
            invalidated: AtomicBool::new(false),
        }
    }

    fn matches(&self, ruleset_id: &str, variables: &RulesetVariables, hash: u64) -> bool {
        self.ruleset_id == ruleset_id && self.variables_hash == hash && *self.variables == *variables
    }

    /// 取层级（不存在时创建）
    pub fn level(&self, parent: Option<NodeHandle>, splice: bool) -> Arc<HierarchyLevel> {
        if let Some(level) = self
            .levels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&parent)
        {
            return level.clone();
        }
        self.levels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(parent)
            .or_insert_with(|| Arc::new(HierarchyLevel::new(parent, splice)))
            .clone()
    }

    pub fn level_count(&self) -> usize {
        self.levels.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 节点入库（Key索引在层级提交节点时登记）
    #[inline]
    pub fn insert(&self, record: NodeRecord) -> NodeHandle {
        self.arena.insert(record)
    }

    /// 登记已提交节点的Key索引（含分组成员，跳过隐藏节点）
    /// 覆盖同Key旧条目：被取消的构建可能留下从未提交的同Key节点
    pub fn commit_keys(&self, handles: &[NodeHandle]) -> NavResult<()> {
        let mut pending: Vec<NodeHandle> = handles.to_vec();
        let mut visible: Vec<(u64, NodeHandle)> = Vec::with_capacity(pending.len());
        while let Some(handle) = pending.pop() {
            let record = self.arena.get(handle)?;
            if record.is_grouping() {
                pending.extend(record.group_children.iter().copied());
            }
            if !record.hidden {
                visible.push((record.node.key.hash, handle));
            }
        }
        let mut index = self.key_index.write().unwrap_or_else(PoisonError::into_inner);
        for (hash, handle) in visible {
            index.insert(hash, handle);
        }
        Ok(())
    }

    /// 按Key查找已物化节点（哈希命中后再比对完整Key）
    pub fn find_by_key(&self, key: &NodeKey) -> Option<NodeHandle> {
        let handle = *self
            .key_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.hash)?;
        let record = self.arena.get(handle).ok()?;
        (record.node.key == *key).then_some(handle)
    }

    pub fn children_flag(&self, handle: NodeHandle) -> Option<bool> {
        self.children_flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .copied()
    }

    pub fn set_children_flag(&self, handle: NodeHandle, flag: bool) {
        self.children_flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, flag);
    }

    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// 组合已失效时返回可重试错误
    pub fn ensure_fresh(&self) -> NavResult<()> {
        if self.is_invalidated() {
            return Err(NavError::StaleLevel {
                ruleset_id: self.ruleset_id.clone(),
            });
        }
        Ok(())
    }
}

/// 层级缓存：有界的组合列表，超出上限时淘汰最早创建的组合
#[derive(Debug)]
pub(crate) struct HierarchyCache {
    max_combinations: usize,
    entries: Mutex<Vec<Arc<Combination>>>,
}

impl HierarchyCache {
    pub fn new(max_combinations: usize) -> Self {
        Self {
            max_combinations: max_combinations.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// 取组合（不存在或规则集已更换时创建）
    pub fn combination(
        &self,
        bundle: Arc<RulesetBundle>,
        variables: &RulesetVariables,
    ) -> Arc<Combination> {
        let hash = variables.snapshot_hash();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(pos) = entries
            .iter()
            .position(|c| c.matches(bundle.id(), variables, hash))
        {
            if Arc::ptr_eq(&entries[pos].bundle, &bundle) {
                return entries[pos].clone();
            }
            log::debug!(
                "Ruleset `{}` changed, dropping its cached hierarchy",
                bundle.id()
            );
            entries.remove(pos).invalidate();
        }

        let combination = Arc::new(Combination::new(bundle, variables.clone()));
        entries.push(combination.clone());
        if entries.len() > self.max_combinations {
            let evicted = entries.remove(0);
            log::debug!(
                "Evicting cached hierarchy of ruleset `{}` ({} levels)",
                evicted.ruleset_id,
                evicted.level_count()
            );
        }
        combination
    }

    /// 使某规则集的全部组合失效，返回失效数量
    pub fn invalidate_ruleset(&self, ruleset_id: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|c| {
            if c.ruleset_id == ruleset_id {
                c.invalidate();
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    pub fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for c in entries.iter() {
            c.invalidate();
        }
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
