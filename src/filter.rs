//! 层级文本过滤
//! 深度优先遍历可见层级（复用层级缓存），按显示标签做字面子串匹配；
//! 返回以根为起点、只包含命中节点及其祖先的子树，并统计每棵子树的命中次数
use serde::{Deserialize, Serialize};

use rsnavtree_engine::{NavNode, TextFilter};

use crate::config::FilterOptions;
use crate::error::NavResult;
use crate::hierarchy::{BoxFuture, LevelBuilder, NodeHandle};
use crate::hierarchy::Want;

/// 过滤结果节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredNode {
    pub node: NavNode,
    /// 节点自身标签是否命中
    pub is_match: bool,
    /// 子树（含自身）的命中次数
    pub occurrences: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FilteredNode>,
}

impl FilteredNode {
    /// 子树内命中的节点数（含自身）
    pub fn matched_nodes(&self) -> usize {
        usize::from(self.is_match) + self.children.iter().map(FilteredNode::matched_nodes).sum::<usize>()
    }
}

/// 过滤遍历状态
struct FilterWalk<'f> {
    filter: &'f TextFilter,
    max_depth: usize,
    /// 剩余可返回的命中节点数
    remaining: usize,
}

impl<'a> LevelBuilder<'a> {
    pub(crate) async fn filter_hierarchy(
        self,
        filter: &TextFilter,
        options: &FilterOptions,
    ) -> NavResult<Vec<FilteredNode>> {
        let mut walk = FilterWalk {
            filter,
            max_depth: options.max_depth,
            remaining: options.max_results,
        };
        let result = self.filter_children(None, 0, &mut walk).await?;
        log::debug!(
            "Filter `{}` matched {} nodes",
            filter.text(),
            result.iter().map(FilteredNode::matched_nodes).sum::<usize>()
        );
        Ok(result)
    }

    fn filter_children<'s, 'f>(
        self,
        parent: Option<NodeHandle>,
        depth: usize,
        walk: &'s mut FilterWalk<'f>,
    ) -> BoxFuture<'s, NavResult<Vec<FilteredNode>>>
    where
        'a: 's,
        'f: 's,
    {
        Box::pin(async move {
            let (handles, _) = self.child_handles(parent, Want::All).await?;
            let mut output = Vec::new();
            for handle in handles {
                if walk.remaining == 0 {
                    break;
                }
                self.check_cancel()?;
                let record = self.combo.arena.get(handle)?;
                let grouping = record.is_grouping();
                let label = record.node.display_label();
                let own = if grouping { 0 } else { walk.filter.occurrences(label) };
                let is_match = own > 0;
                if is_match {
                    walk.remaining -= 1;
                }

                // 分组节点不占用深度
                let child_depth = if grouping { depth } else { depth + 1 };
                let expand = child_depth < walk.max_depth;
                let children = if expand {
                    self.filter_children(Some(handle), child_depth, walk).await?
                } else {
                    Vec::new()
                };
                if !is_match && children.is_empty() {
                    continue;
                }

                let mut node = record.node.clone();
                node.has_children = if expand {
                    Some(self.has_children(handle).await?)
                } else {
                    self.known_children(handle)?
                };
                let occurrences = own + children.iter().map(|c| c.occurrences).sum::<usize>();
                output.push(FilteredNode {
                    node,
                    is_match,
                    occurrences,
                    children,
                });
            }
            Ok(output)
        })
    }
}
