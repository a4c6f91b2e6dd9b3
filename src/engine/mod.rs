// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/mod.rs - 巡检分析引擎
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod align;
mod cluster;
mod consensus;
mod matcher;
mod movements;
mod slots;

use std::thread;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::detection::{InferenceResponse, PixelBox, normalize_predictions};
use crate::layout::{Discrepancy, Layout, Movement};

pub use align::{ShelfAlignment, align_layouts, levenshtein_distance, shelf_similarity};
pub use cluster::cluster_shelves;
pub use consensus::{dedup_boxes, vote_layout};
pub use matcher::{ComparisonOutcome, compare_layouts, positional_discrepancies};
pub use movements::synthesize_movements;
pub use slots::resolve_slots;

/// 分析参数
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
  /// 最低置信度，低于该值的检测框被丢弃
  pub confidence: f32,
  /// 货架层聚类阈值（像素）：底边 y 与层基准线的最大偏差
  pub shelf_threshold: f32,
  /// 空位阈值中标准差的倍数
  pub empty_threshold_multiplier: f32,
  /// 单个间隙最多插入的 EMPTY 数量
  pub max_empty_per_gap: usize,
}

impl Default for AnalysisOptions {
  fn default() -> Self {
    AnalysisOptions {
      confidence: 0.4,
      // 默认不按 y 拆层，拆层阈值由调用方按图幅配置
      shelf_threshold: 100_000.0,
      empty_threshold_multiplier: 1.5,
      max_empty_per_gap: 3,
    }
  }
}

impl AnalysisOptions {
  /// 设置最低置信度
  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  /// 设置货架层聚类阈值
  pub fn with_shelf_threshold(mut self, shelf_threshold: f32) -> Self {
    self.shelf_threshold = shelf_threshold;
    self
  }

  /// 设置空位阈值倍数
  pub fn with_empty_threshold_multiplier(mut self, multiplier: f32) -> Self {
    self.empty_threshold_multiplier = multiplier;
    self
  }

  /// 设置单个间隙的 EMPTY 上限
  pub fn with_max_empty_per_gap(mut self, max_empty_per_gap: usize) -> Self {
    self.max_empty_per_gap = max_empty_per_gap;
    self
  }
}

/// 引擎错误
#[derive(Debug, Error)]
pub enum EngineError {
  /// 没有提供任何检测趟次
  #[error("没有可用的检测趟次")]
  NoPasses,
  /// 所有检测趟次都失败了
  #[error("全部 {failed} 趟检测均失败")]
  AllPassesFailed { failed: usize },
  /// 单趟检测失败
  #[error("检测趟次 {name} 失败")]
  Pass {
    name: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// 检测结果来源
///
/// 引擎不关心检测框从哪来（推理服务、落盘文件、缓存……），
/// 多趟共识分析会在各自的线程里调用 detect
pub trait DetectionSource {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 趟次名称，用于日志与错误信息
  fn name(&self) -> &str;

  /// 获取一趟检测结果
  fn detect(&self) -> Result<InferenceResponse, Self::Error>;
}

/// 一次完整分析的产出
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
  /// 从检测框推断出的实际布局
  pub realized_layout: Layout,
  /// 逐位置差异
  pub discrepancies: Vec<Discrepancy>,
  /// 整体符合度，取值 [0, 100]
  pub similarity_score: f32,
  /// 纠正动作序列
  pub movements: Vec<Movement>,
  /// 计划层到实际层的对齐
  pub alignment: ShelfAlignment,
}

/// 单趟检测的统计信息
#[derive(Debug, Clone, Serialize)]
pub struct PassStats {
  /// 趟次名称
  pub name: String,
  /// 该趟布局单独与计划比对时的差异数
  pub discrepancy_count: usize,
  /// 该趟布局单独与计划比对时的符合度
  pub similarity_score: f32,
}

/// 多趟检测合并的产出
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
  /// 投票后的共识布局
  pub layout: Layout,
  /// 各趟检测框去重后的合并集，供下游可视化使用
  pub merged_boxes: Vec<PixelBox>,
  /// 逐趟统计，长度即参与合并的趟数
  pub pass_stats: Vec<PassStats>,
}

impl ConsensusOutcome {
  /// 参与合并的趟数
  pub fn passes(&self) -> usize {
    self.pass_stats.len()
  }
}

/// 从像素框推断实际布局：先按底边 y 聚类分层，再逐层解析空位
fn layout_from_boxes(boxes: &[PixelBox], options: &AnalysisOptions) -> Layout {
  cluster_shelves(boxes, options.shelf_threshold)
    .iter()
    .map(|cluster| {
      resolve_slots(
        cluster,
        options.empty_threshold_multiplier,
        options.max_empty_per_gap,
      )
    })
    .collect()
}

/// 从一趟推理响应推断实际布局
pub fn build_realized_layout(response: &InferenceResponse, options: &AnalysisOptions) -> Layout {
  let boxes = normalize_predictions(response, options.confidence);
  layout_from_boxes(&boxes, options)
}

/// 比对实际布局与计划布局并合成纠正动作
///
/// 差异报告与符合度来自贪心匹配（容忍层内换位）；
/// 纠正动作则基于逐位置比对合成，换位才能还原为移动指令
fn conclude(expected: &Layout, realized: Layout) -> AnalysisResult {
  let outcome = compare_layouts(expected, &realized);
  let positional = positional_discrepancies(expected, &realized, &outcome.alignment);
  let movements = synthesize_movements(&positional, expected, &realized);

  info!(
    "分析完成: 符合度 {:.1}%，{} 处差异，{} 个纠正动作",
    outcome.similarity_score,
    outcome.discrepancies.len(),
    movements.len()
  );

  AnalysisResult {
    realized_layout: realized,
    discrepancies: outcome.discrepancies,
    similarity_score: outcome.similarity_score,
    movements,
    alignment: outcome.alignment,
  }
}

/// 对单趟推理响应做完整分析
pub fn analyze(
  response: &InferenceResponse,
  expected: &Layout,
  options: &AnalysisOptions,
) -> AnalysisResult {
  conclude(expected, build_realized_layout(response, options))
}

/// 从单个检测来源取一趟结果并做完整分析
pub fn analyze_source<S: DetectionSource>(
  source: &S,
  expected: &Layout,
  options: &AnalysisOptions,
) -> Result<AnalysisResult, EngineError> {
  let response = source.detect().map_err(|error| EngineError::Pass {
    name: source.name().to_string(),
    source: Box::new(error),
  })?;
  Ok(analyze(&response, expected, options))
}

/// 合并多趟推理响应：逐趟推断布局后按位置投票，原始框合并去重，
/// 并记录每趟单独与计划比对的统计
pub fn merge_passes(
  passes: &[(String, InferenceResponse)],
  expected: &Layout,
  options: &AnalysisOptions,
) -> ConsensusOutcome {
  let mut layouts = Vec::with_capacity(passes.len());
  let mut pass_stats = Vec::with_capacity(passes.len());
  let mut all_boxes = Vec::new();

  for (name, response) in passes {
    let boxes = normalize_predictions(response, options.confidence);
    let layout = layout_from_boxes(&boxes, options);
    let outcome = compare_layouts(expected, &layout);
    pass_stats.push(PassStats {
      name: name.clone(),
      discrepancy_count: outcome.discrepancies.len(),
      similarity_score: outcome.similarity_score,
    });
    layouts.push(layout);
    all_boxes.extend(boxes);
  }

  let layout = vote_layout(&layouts);
  let merged_boxes = dedup_boxes(&all_boxes);

  info!(
    "共识合并完成: {} 趟检测 → {} 层，{} 个合并框",
    passes.len(),
    layout.len(),
    merged_boxes.len()
  );

  ConsensusOutcome {
    layout,
    merged_boxes,
    pass_stats,
  }
}

/// 并行取回多趟检测结果，投票合并后做完整分析
///
/// 单趟失败只告警并剔除，全部失败才报错；
/// 只剩一趟时合并退化为直接采用该趟布局
pub fn analyze_consensus<S>(
  sources: &[S],
  expected: &Layout,
  options: &AnalysisOptions,
) -> Result<(AnalysisResult, ConsensusOutcome), EngineError>
where
  S: DetectionSource + Sync,
{
  if sources.is_empty() {
    return Err(EngineError::NoPasses);
  }

  let results: Vec<thread::Result<Result<InferenceResponse, S::Error>>> =
    thread::scope(|scope| {
      let handles: Vec<_> = sources
        .iter()
        .map(|source| scope.spawn(move || source.detect()))
        .collect();
      handles.into_iter().map(|handle| handle.join()).collect()
    });

  let mut passes: Vec<(String, InferenceResponse)> = Vec::new();
  let mut failed = 0usize;

  for (source, result) in sources.iter().zip(results) {
    match result {
      Ok(Ok(response)) => passes.push((source.name().to_string(), response)),
      Ok(Err(error)) => {
        warn!("检测趟次 {} 失败，已剔除: {}", source.name(), error);
        failed += 1;
      }
      Err(_) => {
        warn!("检测趟次 {} 的工作线程异常退出，已剔除", source.name());
        failed += 1;
      }
    }
  }

  if passes.is_empty() {
    return Err(EngineError::AllPassesFailed { failed });
  }

  let consensus = merge_passes(&passes, expected, options);
  let result = conclude(expected, consensus.layout.clone());

  Ok((result, consensus))
}
