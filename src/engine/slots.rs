// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/slots.rs - 货架层内空位推断与编码提取
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
use crate::layout::{EMPTY_SLOT, ShelfLevel, extract_product_code};

/// 把一个货架层内的检测框解析为从左到右的商品编码序列，
/// 在横向间隙过大处插入 EMPTY 哨兵值
///
/// 空位阈值使用四分位距内的“正常”间距估计，抵抗本身就是真实空位的离群值；
/// 每个间隙插入 round(gap / avg_width) 个 EMPTY，上限 max_empty_per_gap
pub fn resolve_slots(
  cluster: &[PixelBox],
  empty_threshold_multiplier: f32,
  max_empty_per_gap: usize,
) -> ShelfLevel {
  if cluster.is_empty() {
    return Vec::new();
  }
  if cluster.len() == 1 {
    return vec![extract_product_code(&cluster[0].class_label)];
  }

  let mut sorted_by_x: Vec<&PixelBox> = cluster.iter().collect();
  sorted_by_x.sort_by(|a, b| a.bottom_left().x.total_cmp(&b.bottom_left().x));

  let avg_width =
    sorted_by_x.iter().map(|b| b.width).sum::<f32>() / sorted_by_x.len() as f32;

  // 相邻商品的中心间距
  let distances: Vec<f32> = sorted_by_x
    .windows(2)
    .map(|pair| {
      let current_center = pair[0].bottom_left().x + pair[0].width / 2.0;
      let next_center = pair[1].bottom_left().x + pair[1].width / 2.0;
      next_center - current_center
    })
    .collect();

  // 只用四分位距内的间距估计均值和标准差，离群间距多半是真实空位
  let mut sorted_distances = distances.clone();
  sorted_distances.sort_by(|a, b| a.total_cmp(b));
  let lower = (sorted_distances.len() as f32 * 0.25).floor() as usize;
  let upper = (sorted_distances.len() as f32 * 0.75).floor() as usize;
  let normal_distances = &sorted_distances[lower..=upper];

  let count = normal_distances.len().max(1) as f32;
  let normal_avg = normal_distances.iter().sum::<f32>() / count;
  let normal_variance = normal_distances
    .iter()
    .map(|d| (d - normal_avg).powi(2))
    .sum::<f32>()
    / count;
  let normal_std_dev = normal_variance.sqrt();

  // 自适应阈值：正常间距 + 可调倍数的标准差 + 平均宽度的 20% 余量，
  // 下限为平均宽度的 80%
  let empty_threshold =
    normal_avg + empty_threshold_multiplier * normal_std_dev + avg_width * 0.2;
  let final_threshold = empty_threshold.max(avg_width * 0.8);

  debug!(
    "空位阈值: {:.1}（正常间距 {:.1}，标准差 {:.1}，平均宽度 {:.1}）",
    final_threshold, normal_avg, normal_std_dev, avg_width
  );

  let mut shelf = vec![extract_product_code(&sorted_by_x[0].class_label)];

  for pair in sorted_by_x.windows(2) {
    let (current, next) = (pair[0], pair[1]);

    // 当前商品右边缘到下一个商品左边缘的实际空隙
    let gap_width = next.bottom_left().x - (current.bottom_left().x + current.width);

    if gap_width > final_threshold {
      let num_empty = ((gap_width / avg_width).round() as usize).clamp(1, max_empty_per_gap);
      for _ in 0..num_empty {
        shelf.push(EMPTY_SLOT.to_string());
      }
    }

    shelf.push(extract_product_code(&next.class_label));
  }

  shelf
}

#[cfg(test)]
mod tests {
  use super::*;

  fn box_at(x1: f32, label: &str) -> PixelBox {
    PixelBox {
      class_label: label.to_string(),
      confidence: 0.9,
      x1,
      y1: 0.0,
      x2: x1 + 100.0,
      y2: 100.0,
      width: 100.0,
      height: 100.0,
    }
  }

  /// 九个等距商品（左边缘间隔 110），最后再接一个间隙为 gap 的商品。
  /// 正常间距带均值 110、标准差 0，阈值 = 110 + 0.2*100 = 130
  fn row_with_tail_gap(gap: f32) -> Vec<PixelBox> {
    let mut boxes: Vec<PixelBox> = (0..9)
      .map(|i| box_at(i as f32 * 110.0, &format!("{}-producto", 100 + i)))
      .collect();
    boxes.push(box_at(880.0 + 100.0 + gap, "999-producto"));
    boxes
  }

  #[test]
  fn single_item_is_single_slot() {
    let shelf = resolve_slots(&[box_at(0.0, "750100-refresco")], 1.5, 3);
    assert_eq!(shelf, vec!["750100"]);
  }

  #[test]
  fn items_sorted_left_to_right() {
    let boxes = vec![box_at(220.0, "3-c"), box_at(0.0, "1-a"), box_at(110.0, "2-b")];
    let shelf = resolve_slots(&boxes, 1.5, 3);
    assert_eq!(shelf, vec!["1", "2", "3"]);
  }

  #[test]
  fn gap_at_threshold_inserts_nothing() {
    let shelf = resolve_slots(&row_with_tail_gap(130.0), 1.5, 3);
    assert_eq!(shelf.len(), 10);
    assert!(!shelf.contains(&EMPTY_SLOT.to_string()));
  }

  #[test]
  fn gap_just_over_threshold_inserts_one_empty() {
    let shelf = resolve_slots(&row_with_tail_gap(131.0), 1.5, 3);
    assert_eq!(shelf.len(), 11);
    assert_eq!(shelf[9], EMPTY_SLOT);
  }

  #[test]
  fn huge_gap_is_capped() {
    let shelf = resolve_slots(&row_with_tail_gap(2000.0), 1.5, 3);
    let empties = shelf.iter().filter(|c| *c == EMPTY_SLOT).count();
    assert_eq!(empties, 3);
  }

  #[test]
  fn cap_is_configurable() {
    let shelf = resolve_slots(&row_with_tail_gap(2000.0), 1.5, 5);
    let empties = shelf.iter().filter(|c| *c == EMPTY_SLOT).count();
    assert_eq!(empties, 5);
  }

  #[test]
  fn two_widths_gap_inserts_two_empties() {
    // 间隙约两个平均宽度：round(230 / 100) = 2
    let shelf = resolve_slots(&row_with_tail_gap(230.0), 1.5, 3);
    let empties = shelf.iter().filter(|c| *c == EMPTY_SLOT).count();
    assert_eq!(empties, 2);
  }
}
