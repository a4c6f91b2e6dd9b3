// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/matcher.rs - 层内贪心匹配与差异生成
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

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::engine::align::{ShelfAlignment, align_layouts};
use crate::layout::{Discrepancy, EMPTY_SLOT, Layout, VACANT, is_absent};

/// 布局比对结果
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
  /// 逐位置差异
  pub discrepancies: Vec<Discrepancy>,
  /// 整体符合度，取值 [0, 100]
  pub similarity_score: f32,
  /// 计划层到实际层的对齐
  pub alignment: ShelfAlignment,
}

/// 单层匹配结果：累计匹配得分与该层差异
struct ShelfMatch {
  credit: f32,
  discrepancies: Vec<Discrepancy>,
}

/// 对一对已对齐的货架层做贪心最优匹配
///
/// 计划侧逐位消费：空位消费实际层的一个 EMPTY（计半分）；
/// 商品消费索引最接近的同编码实际位；无可消费者记缺货差异。
/// 计划侧处理完后，实际层所有未被消费的非空位记多货差异
fn match_shelf(shelf_index: usize, plan: &[String], real: &[String]) -> ShelfMatch {
  let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
  for (pos, code) in real.iter().enumerate() {
    positions.entry(code.as_str()).or_default().push(pos);
  }

  let mut used: HashSet<usize> = HashSet::new();
  let mut credit = 0.0f32;
  let mut discrepancies = Vec::new();

  for (plan_pos, product) in plan.iter().enumerate() {
    if is_absent(product) {
      // 空位对空位：取第一个可用的 EMPTY，计半分；
      // 双方都是空位时没有差异可报
      if let Some(list) = positions.get_mut(EMPTY_SLOT)
        && !list.is_empty()
      {
        used.insert(list.remove(0));
        credit += 0.5;
      }
      continue;
    }

    let nearest = positions.get_mut(product.as_str()).and_then(|list| {
      let best = list
        .iter()
        .enumerate()
        .min_by_key(|(_, pos)| pos.abs_diff(plan_pos))
        .map(|(idx, _)| idx)?;
      Some(list.remove(best))
    });

    match nearest {
      Some(real_pos) => {
        used.insert(real_pos);
        credit += 1.0;
      }
      None => discrepancies.push(Discrepancy {
        shelf_index,
        slot_index: plan_pos,
        expected: product.clone(),
        found: VACANT.to_string(),
      }),
    }
  }

  for (pos, code) in real.iter().enumerate() {
    if !used.contains(&pos) && !is_absent(code) {
      discrepancies.push(Discrepancy {
        shelf_index,
        slot_index: pos,
        expected: VACANT.to_string(),
        found: code.clone(),
      });
    }
  }

  ShelfMatch {
    credit,
    discrepancies,
  }
}

/// 比对计划布局与实际布局，生成差异列表与整体符合度
///
/// 先做层对齐，再对每对已对齐的层做贪心匹配；
/// 未映射的计划层整层按缺货处理，未被引用的实际层整层按多货处理。
/// 符合度 = 匹配得分 / 计划总位数 × 100，0/0 约定为 100
pub fn compare_layouts(expected: &Layout, realized: &Layout) -> ComparisonOutcome {
  let alignment = align_layouts(expected, realized);

  let total_slots: usize = expected.iter().map(|shelf| shelf.len()).sum();
  let mut credit = 0.0f32;
  let mut discrepancies = Vec::new();

  for (i, plan_shelf) in expected.iter().enumerate() {
    match alignment[i].and_then(|j| realized.get(j)) {
      Some(real_shelf) => {
        let outcome = match_shelf(i, plan_shelf, real_shelf);
        credit += outcome.credit;
        discrepancies.extend(outcome.discrepancies);
      }
      None => {
        // 整层缺失：所有非空位都按缺货登记
        for (pos, product) in plan_shelf.iter().enumerate() {
          if !is_absent(product) {
            discrepancies.push(Discrepancy {
              shelf_index: i,
              slot_index: pos,
              expected: product.clone(),
              found: VACANT.to_string(),
            });
          }
        }
      }
    }
  }

  // 未被任何计划层引用的实际层是多余层
  for (j, real_shelf) in realized.iter().enumerate() {
    if alignment.contains(&Some(j)) {
      continue;
    }
    for (pos, code) in real_shelf.iter().enumerate() {
      if !is_absent(code) {
        discrepancies.push(Discrepancy {
          shelf_index: expected.len(),
          slot_index: pos,
          expected: VACANT.to_string(),
          found: code.clone(),
        });
      }
    }
  }

  let similarity_score = if total_slots == 0 {
    100.0
  } else {
    credit / total_slots as f32 * 100.0
  };

  debug!(
    "布局比对完成: {} 处差异，符合度 {:.1}%",
    discrepancies.len(),
    similarity_score
  );

  ComparisonOutcome {
    discrepancies,
    similarity_score,
    alignment,
  }
}

/// 逐位置差异：已对齐的计划层与实际层在同一位置上直接比对
///
/// 与贪心匹配不同，层内换位在这里会产生两条“摆错商品”差异，
/// 动作合成依赖这种位置信息来生成移动指令而不是一对补货加下架。
/// 未映射的计划层按整层缺货处理；未被引用的实际层按其实际层号登记多货
pub fn positional_discrepancies(
  expected: &Layout,
  realized: &Layout,
  alignment: &ShelfAlignment,
) -> Vec<Discrepancy> {
  let mut discrepancies = Vec::new();

  for (i, plan_shelf) in expected.iter().enumerate() {
    match alignment[i].and_then(|j| realized.get(j)) {
      Some(real_shelf) => {
        for pos in 0..plan_shelf.len().max(real_shelf.len()) {
          let plan_code = plan_shelf.get(pos).filter(|c| !is_absent(c));
          let real_code = real_shelf.get(pos).filter(|c| !is_absent(c));
          if plan_code == real_code {
            continue;
          }
          discrepancies.push(Discrepancy {
            shelf_index: i,
            slot_index: pos,
            expected: plan_code.cloned().unwrap_or_else(|| VACANT.to_string()),
            found: real_code.cloned().unwrap_or_else(|| VACANT.to_string()),
          });
        }
      }
      None => {
        for (pos, product) in plan_shelf.iter().enumerate() {
          if !is_absent(product) {
            discrepancies.push(Discrepancy {
              shelf_index: i,
              slot_index: pos,
              expected: product.clone(),
              found: VACANT.to_string(),
            });
          }
        }
      }
    }
  }

  for (j, real_shelf) in realized.iter().enumerate() {
    if alignment.contains(&Some(j)) {
      continue;
    }
    for (pos, code) in real_shelf.iter().enumerate() {
      if !is_absent(code) {
        discrepancies.push(Discrepancy {
          shelf_index: j,
          slot_index: pos,
          expected: VACANT.to_string(),
          found: code.clone(),
        });
      }
    }
  }

  discrepancies
}
