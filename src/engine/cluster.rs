// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/engine/cluster.rs - 货架层聚类
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

/// 一个货架层的平均底边 y 坐标
fn mean_bottom_y(cluster: &[PixelBox]) -> f32 {
  cluster.iter().map(|b| b.bottom_left().y).sum::<f32>() / cluster.len() as f32
}

/// 按底边 y 坐标把检测框聚类为有序的货架层
///
/// 贪心累积：只要下一个框的底边与当前层的平均底边相差不超过
/// shelf_threshold 就归入当前层，否则另起一层；
/// 最后按平均底边从大到小排序，使屏幕最下方（离地面最近）的货架层为索引 0
pub fn cluster_shelves(boxes: &[PixelBox], shelf_threshold: f32) -> Vec<Vec<PixelBox>> {
  if boxes.is_empty() {
    return Vec::new();
  }

  let mut sorted_by_y: Vec<PixelBox> = boxes.to_vec();
  sorted_by_y.sort_by(|a, b| a.bottom_left().y.total_cmp(&b.bottom_left().y));

  let mut shelves: Vec<Vec<PixelBox>> = Vec::new();
  let mut current_shelf = vec![sorted_by_y[0].clone()];
  let mut baseline_y = sorted_by_y[0].bottom_left().y;

  for item in sorted_by_y.into_iter().skip(1) {
    let bottom_y = item.bottom_left().y;

    if (baseline_y - bottom_y).abs() > shelf_threshold {
      shelves.push(std::mem::replace(&mut current_shelf, vec![item]));
      baseline_y = bottom_y;
    } else {
      current_shelf.push(item);
      // 基准线更新为当前层所有框的平均底边
      baseline_y = mean_bottom_y(&current_shelf);
    }
  }

  shelves.push(current_shelf);

  // 从下到上排序：y 越大越靠近地面
  shelves.sort_by(|a, b| mean_bottom_y(b).total_cmp(&mean_bottom_y(a)));

  debug!("货架层聚类完成: {} 个框分为 {} 层", boxes.len(), shelves.len());

  shelves
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::{Detection, ImageSize, PixelBox};

  fn box_at(x: f32, y: f32) -> PixelBox {
    let det = Detection {
      class_label: "750100-refresco".to_string(),
      confidence: 0.9,
      x,
      y,
      width: 0.05,
      height: 0.1,
    };
    PixelBox::from_detection(
      &det,
      ImageSize {
        width: 1000,
        height: 1000,
      },
    )
  }

  #[test]
  fn empty_input_yields_empty_output() {
    assert!(cluster_shelves(&[], 50.0).is_empty());
  }

  #[test]
  fn single_box_forms_single_shelf() {
    let shelves = cluster_shelves(&[box_at(0.5, 0.5)], 50.0);
    assert_eq!(shelves.len(), 1);
    assert_eq!(shelves[0].len(), 1);
  }

  #[test]
  fn rows_split_when_gap_exceeds_threshold() {
    // 两排框，底边相差 400 像素
    let boxes = vec![
      box_at(0.2, 0.2),
      box_at(0.4, 0.2),
      box_at(0.2, 0.6),
      box_at(0.4, 0.6),
    ];
    let shelves = cluster_shelves(&boxes, 50.0);
    assert_eq!(shelves.len(), 2);
    assert_eq!(shelves[0].len(), 2);
    assert_eq!(shelves[1].len(), 2);
  }

  #[test]
  fn bottom_shelf_comes_first() {
    let boxes = vec![box_at(0.5, 0.2), box_at(0.5, 0.8)];
    let shelves = cluster_shelves(&boxes, 50.0);
    assert_eq!(shelves.len(), 2);
    // 索引 0 应是 y 较大（更靠近地面）的那一层
    assert!(shelves[0][0].bottom_left().y > shelves[1][0].bottom_left().y);
  }

  #[test]
  fn near_rows_merge_within_threshold() {
    let boxes = vec![box_at(0.2, 0.50), box_at(0.4, 0.52), box_at(0.6, 0.51)];
    let shelves = cluster_shelves(&boxes, 50.0);
    assert_eq!(shelves.len(), 1);
    assert_eq!(shelves[0].len(), 3);
  }
}
