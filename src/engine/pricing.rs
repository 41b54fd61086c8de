use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::catalog::Service;
use crate::models::order::{DesiredService, ServiceLine};

/// Turns requested service lines into priced `desired_services`.
pub trait PricingCalculator: Send + Sync {
    fn price(&self, lines: &[ServiceLine]) -> Result<Vec<DesiredService>, AppError>;
}

/// In-memory service catalog that prices each line as unit price times quantity.
#[derive(Default)]
pub struct ServiceCatalog {
    services: DashMap<Uuid, Service>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: String, price_cents: u64) -> Service {
        let service = Service {
            id: Uuid::new_v4(),
            name,
            price_cents,
        };
        self.services.insert(service.id, service.clone());
        service
    }

    pub fn list(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self
            .services
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }
}

impl PricingCalculator for ServiceCatalog {
    fn price(&self, lines: &[ServiceLine]) -> Result<Vec<DesiredService>, AppError> {
        if lines.is_empty() {
            return Err(AppError::BadRequest(
                "pricing needs at least one service".to_string(),
            ));
        }

        lines
            .iter()
            .map(|line| {
                if line.quantity == 0 {
                    return Err(AppError::BadRequest(format!(
                        "quantity for service {} must be > 0",
                        line.service_id
                    )));
                }

                let service = self.services.get(&line.service_id).ok_or_else(|| {
                    AppError::NotFound(format!("service {} not found", line.service_id))
                })?;

                let cost_cents = service
                    .price_cents
                    .checked_mul(u64::from(line.quantity))
                    .ok_or_else(|| {
                        AppError::BadRequest(format!(
                            "cost of service {} overflows",
                            line.service_id
                        ))
                    })?;

                Ok(DesiredService {
                    service_id: service.id,
                    name: service.name.clone(),
                    quantity: line.quantity,
                    cost_cents,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{PricingCalculator, ServiceCatalog};
    use crate::error::AppError;
    use crate::models::order::ServiceLine;

    #[test]
    fn lines_are_priced_by_quantity() {
        let catalog = ServiceCatalog::new();
        let shirt = catalog.add("Shirt".to_string(), 500);
        let suit = catalog.add("Suit".to_string(), 1800);

        let priced = catalog
            .price(&[
                ServiceLine {
                    service_id: shirt.id,
                    quantity: 3,
                },
                ServiceLine {
                    service_id: suit.id,
                    quantity: 1,
                },
            ])
            .unwrap();

        assert_eq!(priced.len(), 2);
        assert_eq!(priced[0].cost_cents, 1500);
        assert_eq!(priced[1].name, "Suit");
        assert_eq!(priced.iter().map(|line| line.cost_cents).sum::<u64>(), 3300);
    }

    #[test]
    fn unknown_service_is_not_found() {
        let catalog = ServiceCatalog::new();
        let result = catalog.price(&[ServiceLine {
            service_id: Uuid::new_v4(),
            quantity: 1,
        }]);

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn zero_quantity_and_empty_requests_are_rejected() {
        let catalog = ServiceCatalog::new();
        let shirt = catalog.add("Shirt".to_string(), 500);

        assert!(matches!(catalog.price(&[]), Err(AppError::BadRequest(_))));
        assert!(matches!(
            catalog.price(&[ServiceLine {
                service_id: shirt.id,
                quantity: 0
            }]),
            Err(AppError::BadRequest(_))
        ));
    }
}
