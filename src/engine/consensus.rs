// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/consensus.rs - 多模型结果合并
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

use tracing::debug;

use crate::detection::PixelBox;
use crate::layout::Layout;

/// 重叠框去重阈值：相交面积 / 较小框面积
const OVERLAP_THRESHOLD: f32 = 0.5;

/// 按位置多数投票合并多个识别布局
///
/// 对每个 (货架层, 位置) 统计各趟检测给出的编码并取多数；
/// 平票时按先出现的检测趟次优先
pub fn vote_layout(layouts: &[Layout]) -> Layout {
  if layouts.is_empty() {
    return Vec::new();
  }
  if layouts.len() == 1 {
    return layouts[0].clone();
  }

  let shelf_count = layouts.iter().map(|l| l.len()).max().unwrap_or(0);
  let mut consensus = Vec::with_capacity(shelf_count);

  for shelf_index in 0..shelf_count {
    let slot_count = layouts
      .iter()
      .filter_map(|l| l.get(shelf_index))
      .map(|s| s.len())
      .max()
      .unwrap_or(0);

    let mut shelf = Vec::with_capacity(slot_count);

    for slot_index in 0..slot_count {
      // 先到先登记，保证平票时第一趟胜出
      let mut tally: Vec<(&str, usize)> = Vec::new();
      for layout in layouts {
        let Some(code) = layout.get(shelf_index).and_then(|s| s.get(slot_index)) else {
          continue;
        };
        match tally.iter_mut().find(|(c, _)| *c == code.as_str()) {
          Some((_, count)) => *count += 1,
          None => tally.push((code, 1)),
        }
      }

      let mut winner = tally[0];
      for candidate in &tally[1..] {
        if candidate.1 > winner.1 {
          winner = *candidate;
        }
      }
      shelf.push(winner.0.to_string());
    }

    consensus.push(shelf);
  }

  debug!("多数投票合并完成: {} 趟检测 → {} 层", layouts.len(), consensus.len());

  consensus
}

/// 合并多趟检测的原始框：重叠且同类的框只保留置信度最高的一个
///
/// 仅用于下游可视化与合并元数据，不影响投票布局
pub fn dedup_boxes(boxes: &[PixelBox]) -> Vec<PixelBox> {
  let mut remaining: Vec<PixelBox> = boxes.to_vec();
  let mut kept = Vec::new();

  while !remaining.is_empty() {
    let current = remaining.remove(0);
    let mut group = vec![current];

    let mut i = 0;
    while i < remaining.len() {
      let anchor = &group[0];
      let other = &remaining[i];
      let min_area = anchor.area().min(other.area());
      let overlapping = min_area > 0.0
        && anchor.intersection_area(other) / min_area > OVERLAP_THRESHOLD
        && anchor.class_label == other.class_label;

      if overlapping {
        group.push(remaining.remove(i));
      } else {
        i += 1;
      }
    }

    let mut best = group.remove(0);
    for candidate in group {
      if candidate.confidence > best.confidence {
        best = candidate;
      }
    }
    kept.push(best);
  }

  debug!("重叠框去重完成: {} → {}", boxes.len(), kept.len());

  kept
}
