// 该文件是 Huojia （货架巡检） 项目的一部分。
// src/detection.rs - 检测结果与像素框定义
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

use serde::{Deserialize, Serialize};
use tracing::debug;

/// 推理服务返回的单个检测框（归一化坐标，0..1）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
  /// 类别标签，格式为 “条码-商品名”
  #[serde(rename = "class")]
  pub class_label: String,
  /// 置信度
  pub confidence: f32,
  /// 中心点 x 坐标
  pub x: f32,
  /// 中心点 y 坐标
  pub y: f32,
  /// 框宽度
  pub width: f32,
  /// 框高度
  pub height: f32,
}

/// 原始图像尺寸
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
}

/// 推理服务的完整响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
  pub predictions: Vec<Detection>,
  pub image: ImageSize,
}

/// 像素坐标点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

/// 像素空间边界框，由归一化检测框换算得出，仅在单次分析内有效
#[derive(Debug, Clone)]
pub struct PixelBox {
  pub class_label: String,
  pub confidence: f32,
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
  /// 像素宽度
  pub width: f32,
  /// 像素高度
  pub height: f32,
}

impl PixelBox {
  /// 把一个归一化检测框换算到像素空间
  ///
  /// 纯函数，不做几何校验；非法的几何值原样传递，由调用方负责
  pub fn from_detection(det: &Detection, image: ImageSize) -> Self {
    let pixel_x = (det.x * image.width as f32).round();
    let pixel_y = (det.y * image.height as f32).round();
    let pixel_w = (det.width * image.width as f32).round();
    let pixel_h = (det.height * image.height as f32).round();

    PixelBox {
      class_label: det.class_label.clone(),
      confidence: det.confidence,
      x1: pixel_x - pixel_w / 2.0,
      y1: pixel_y - pixel_h / 2.0,
      x2: pixel_x + pixel_w / 2.0,
      y2: pixel_y + pixel_h / 2.0,
      width: pixel_w,
      height: pixel_h,
    }
  }

  /// 左下角点（货架聚类以底边为基准）
  pub fn bottom_left(&self) -> Point {
    Point {
      x: self.x1,
      y: self.y2,
    }
  }

  /// 右下角点
  pub fn bottom_right(&self) -> Point {
    Point {
      x: self.x2,
      y: self.y2,
    }
  }

  /// 框面积
  pub fn area(&self) -> f32 {
    (self.x2 - self.x1) * (self.y2 - self.y1)
  }

  /// 与另一个框的相交面积，不相交时为 0
  pub fn intersection_area(&self, other: &PixelBox) -> f32 {
    let overlap_x1 = self.x1.max(other.x1);
    let overlap_y1 = self.y1.max(other.y1);
    let overlap_x2 = self.x2.min(other.x2);
    let overlap_y2 = self.y2.min(other.y2);

    if overlap_x1 < overlap_x2 && overlap_y1 < overlap_y2 {
      (overlap_x2 - overlap_x1) * (overlap_y2 - overlap_y1)
    } else {
      0.0
    }
  }
}

/// 过滤低置信度检测并换算到像素空间
pub fn normalize_predictions(response: &InferenceResponse, min_confidence: f32) -> Vec<PixelBox> {
  let boxes: Vec<PixelBox> = response
    .predictions
    .iter()
    .filter(|det| det.confidence >= min_confidence)
    .map(|det| PixelBox::from_detection(det, response.image))
    .collect();

  debug!(
    "检测框换算完成: 共 {} 个，保留 {} 个（置信度阈值 {}）",
    response.predictions.len(),
    boxes.len(),
    min_confidence
  );

  boxes
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
    Detection {
      class_label: "750100-refresco".to_string(),
      confidence: 0.9,
      x,
      y,
      width: w,
      height: h,
    }
  }

  #[test]
  fn pixel_box_corners_follow_half_extent() {
    let image = ImageSize {
      width: 1000,
      height: 800,
    };
    let pb = PixelBox::from_detection(&detection(0.5, 0.5, 0.1, 0.2), image);

    assert_eq!(pb.width, 100.0);
    assert_eq!(pb.height, 160.0);
    assert_eq!(pb.x1, 450.0);
    assert_eq!(pb.x2, 550.0);
    assert_eq!(pb.y1, 320.0);
    assert_eq!(pb.y2, 480.0);
    assert_eq!(pb.bottom_left(), Point { x: 450.0, y: 480.0 });
    assert_eq!(pb.bottom_right(), Point { x: 550.0, y: 480.0 });
  }

  #[test]
  fn intersection_area_of_disjoint_boxes_is_zero() {
    let image = ImageSize {
      width: 100,
      height: 100,
    };
    let a = PixelBox::from_detection(&detection(0.2, 0.2, 0.1, 0.1), image);
    let b = PixelBox::from_detection(&detection(0.8, 0.8, 0.1, 0.1), image);
    assert_eq!(a.intersection_area(&b), 0.0);
  }

  #[test]
  fn intersection_area_of_nested_boxes_is_inner_area() {
    let image = ImageSize {
      width: 100,
      height: 100,
    };
    let outer = PixelBox::from_detection(&detection(0.5, 0.5, 0.4, 0.4), image);
    let inner = PixelBox::from_detection(&detection(0.5, 0.5, 0.2, 0.2), image);
    assert_eq!(outer.intersection_area(&inner), inner.area());
  }

  #[test]
  fn normalize_drops_low_confidence() {
    let mut low = detection(0.5, 0.5, 0.1, 0.1);
    low.confidence = 0.2;
    let response = InferenceResponse {
      predictions: vec![detection(0.5, 0.5, 0.1, 0.1), low],
      image: ImageSize {
        width: 100,
        height: 100,
      },
    };
    assert_eq!(normalize_predictions(&response, 0.4).len(), 1);
  }
}
