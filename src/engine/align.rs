// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/align.rs - 货架层对齐（DTW 与编辑距离）
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

use std::collections::HashMap;

use tracing::debug;

use crate::layout::{Layout, is_absent};

/// 计划层索引到实际层索引的映射，None 表示该计划层没有对应的实际层
pub type ShelfAlignment = Vec<Option<usize>>;

/// 修补阶段允许的最大层距
const REPAIR_MAX_DISTANCE: usize = 2;

/// 两个编码序列的编辑距离
///
/// 替换代价：相同为 0，一侧是空位为 0.5，不同商品为 1；
/// 空位哨兵（EMPTY/vacío）互相视为相同
pub fn levenshtein_distance(a: &[String], b: &[String]) -> f32 {
  if a.is_empty() {
    return b.len() as f32;
  }
  if b.is_empty() {
    return a.len() as f32;
  }

  let mut matrix = vec![vec![0.0f32; b.len() + 1]; a.len() + 1];
  for (i, row) in matrix.iter_mut().enumerate() {
    row[0] = i as f32;
  }
  for j in 0..=b.len() {
    matrix[0][j] = j as f32;
  }

  for i in 1..=a.len() {
    for j in 1..=b.len() {
      let (left, right) = (&a[i - 1], &b[j - 1]);
      let cost = if left == right || (is_absent(left) && is_absent(right)) {
        0.0
      } else if is_absent(left) || is_absent(right) {
        0.5
      } else {
        1.0
      };

      matrix[i][j] = (matrix[i - 1][j] + 1.0)
        .min(matrix[i][j - 1] + 1.0)
        .min(matrix[i - 1][j - 1] + cost);
    }
  }

  matrix[a.len()][b.len()]
}

/// 两个货架层的相似度，取值 [0, 100]
///
/// 加权混合：60% 商品重合率（空位对空位计半分）、
/// 25% 序列相似度（编辑距离）、15% 长度相似度
pub fn shelf_similarity(plan: &[String], real: &[String]) -> f32 {
  // 商品重合率：实际层的编码做频次表，计划层逐个消费
  let mut real_counts: HashMap<&str, usize> = HashMap::new();
  for code in real {
    if !is_absent(code) {
      *real_counts.entry(code.as_str()).or_insert(0) += 1;
    }
  }

  let mut matches = 0.0f32;
  for code in plan {
    if is_absent(code) {
      if real.iter().any(|c| is_absent(c)) {
        matches += 0.5;
      }
    } else if let Some(count) = real_counts.get_mut(code.as_str())
      && *count > 0
    {
      matches += 1.0;
      *count -= 1;
    }
  }
  let coincidence = if plan.is_empty() {
    0.0
  } else {
    matches / plan.len() as f32
  };

  let max_length = plan.len().max(real.len());
  let sequence = if max_length > 0 {
    1.0 - levenshtein_distance(plan, real) / max_length as f32
  } else {
    0.0
  };

  let length = if max_length > 0 {
    1.0 - (plan.len() as f32 - real.len() as f32).abs() / max_length as f32
  } else {
    0.0
  };

  (coincidence * 0.6 + sequence * 0.25 + length * 0.15) * 100.0
}

/// 用 DTW 在计划布局与实际布局的货架层之间寻找最优对齐
///
/// 代价矩阵只在自适应窗口内计算（|i-j| ≤ max(1, ⌊0.2m⌋)），
/// 窗口外视为不可达；回溯时平局优先取对角线（直接对应）；
/// 最后为未映射的计划层做一次就近修补
pub fn align_layouts(plan: &Layout, real: &Layout) -> ShelfAlignment {
  let (m, n) = (plan.len(), real.len());
  if m == 0 || n == 0 {
    return vec![None; m];
  }

  // 窗口内的逐对代价：100 - 相似度
  let tolerance = 1.max((m as f32 * 0.2).floor() as usize);
  let mut cost = vec![vec![f32::INFINITY; n]; m];
  for (i, plan_shelf) in plan.iter().enumerate() {
    let low = i.saturating_sub(tolerance);
    let high = (i + tolerance).min(n - 1);
    for (j, real_shelf) in real.iter().enumerate().take(high + 1).skip(low) {
      cost[i][j] = 100.0 - shelf_similarity(plan_shelf, real_shelf);
    }
  }

  // DTW 累积矩阵，边界按行/列累加
  let mut acc = vec![vec![f32::INFINITY; n]; m];
  acc[0][0] = cost[0][0];
  for i in 1..m {
    acc[i][0] = acc[i - 1][0] + cost[i][0];
  }
  for j in 1..n {
    acc[0][j] = acc[0][j - 1] + cost[0][j];
  }
  for i in 1..m {
    for j in 1..n {
      acc[i][j] = cost[i][j] + acc[i - 1][j].min(acc[i][j - 1]).min(acc[i - 1][j - 1]);
    }
  }

  // 回溯最优路径
  let mut alignment: ShelfAlignment = vec![None; m];
  let (mut i, mut j) = (m - 1, n - 1);
  alignment[i] = Some(j);

  while i > 0 || j > 0 {
    if i == 0 {
      j -= 1;
    } else if j == 0 {
      i -= 1;
      alignment[i] = Some(0);
    } else {
      let diagonal = acc[i - 1][j - 1];
      let up = acc[i - 1][j];
      let left = acc[i][j - 1];
      let min_value = diagonal.min(up).min(left);

      if min_value == diagonal {
        i -= 1;
        j -= 1;
        alignment[i] = Some(j);
      } else if min_value == up {
        // 该计划层没有对应的实际层
        i -= 1;
        alignment[i] = None;
      } else {
        j -= 1;
      }
    }
  }

  // 修补：未映射的计划层就近分配一个尚未使用的实际层
  for k in 0..m {
    if alignment[k].is_some() {
      continue;
    }

    let mut best: Option<(usize, usize)> = None;
    for candidate in 0..n {
      if alignment.contains(&Some(candidate)) {
        continue;
      }
      let distance = k.abs_diff(candidate);
      if best.is_none_or(|(_, d)| distance < d) {
        best = Some((candidate, distance));
      }
    }

    if let Some((candidate, distance)) = best
      && distance <= REPAIR_MAX_DISTANCE
    {
      alignment[k] = Some(candidate);
    }
  }

  debug!("货架层对齐: {} 层计划 × {} 层实际 → {:?}", m, n, alignment);

  alignment
}
